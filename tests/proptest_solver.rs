//! Property tests for the rule solver.
//!
//! The central property: for non-transitive rules, iterating a compiled
//! rule produces exactly the assignments a brute-force evaluator finds
//! by enumerating every combination of variable values. Transitive
//! evaluation has its own scenario tests; here all predicates are plain,
//! so the two evaluators must agree on sets.

use proptest::prelude::*;
use std::collections::BTreeSet;

use quarry::entity::pair_id;
use quarry::solver::OpKind;
use quarry::{EntityId, Rule, World};

const NUM_ENTITIES: usize = 5;
const NUM_PREDS: usize = 2;

/// Hard cap on iterator steps; a run that hits it is a termination bug.
const MAX_YIELDS: usize = 10_000;

#[derive(Clone, Debug)]
struct Facts {
    /// (subject, predicate, object) indices
    pairs: Vec<(usize, usize, usize)>,
    /// (subject, predicate-as-plain-id) indices
    plain: Vec<(usize, usize)>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Slot {
    This,
    X,
    Y,
    Ent(usize),
}

#[derive(Clone, Debug)]
struct TestTerm {
    pred: usize,
    subject: Slot,
    object: Option<Slot>,
}

fn arb_facts() -> impl Strategy<Value = Facts> {
    (
        prop::collection::vec(
            (0..NUM_ENTITIES, 0..NUM_PREDS, 0..NUM_ENTITIES),
            0..8,
        ),
        prop::collection::vec((0..NUM_ENTITIES, 0..NUM_PREDS), 0..4),
    )
        .prop_map(|(pairs, plain)| Facts { pairs, plain })
}

fn arb_subject() -> impl Strategy<Value = Slot> {
    prop_oneof![
        Just(Slot::This),
        Just(Slot::X),
        Just(Slot::Y),
        (0..NUM_ENTITIES).prop_map(Slot::Ent),
    ]
}

fn arb_object() -> impl Strategy<Value = Slot> {
    prop_oneof![
        Just(Slot::X),
        Just(Slot::Y),
        (0..NUM_ENTITIES).prop_map(Slot::Ent),
    ]
}

fn arb_term() -> impl Strategy<Value = TestTerm> {
    (0..NUM_PREDS, arb_subject(), prop::option::of(arb_object()))
        .prop_map(|(pred, subject, object)| TestTerm {
            pred,
            subject,
            object,
        })
        // A name standing both as subject and object of one term keys
        // two distinct register incarnations; exclude the degenerate
        // shape rather than model it in the oracle.
        .prop_filter("subject and object use the same variable", |t| {
            !(matches!(t.subject, Slot::X | Slot::Y) && t.object == Some(t.subject))
        })
}

fn arb_terms() -> impl Strategy<Value = Vec<TestTerm>> {
    prop::collection::vec(arb_term(), 1..=3)
}

struct TestWorld {
    world: World,
    entities: Vec<EntityId>,
    preds: Vec<EntityId>,
}

fn build_world(facts: &Facts) -> TestWorld {
    let mut world = World::new();
    let preds: Vec<EntityId> = (0..NUM_PREDS)
        .map(|i| world.entity(&format!("P{}", i)))
        .collect();
    let entities: Vec<EntityId> = (0..NUM_ENTITIES)
        .map(|i| world.entity(&format!("E{}", i)))
        .collect();

    for &(s, p, o) in &facts.pairs {
        world.add_pair(entities[s], preds[p], entities[o]);
    }
    for &(s, p) in &facts.plain {
        world.add(entities[s], preds[p]);
    }

    TestWorld {
        world,
        entities,
        preds,
    }
}

fn slot_text(slot: Slot) -> String {
    match slot {
        Slot::This => ".".to_string(),
        Slot::X => "X".to_string(),
        Slot::Y => "Y".to_string(),
        Slot::Ent(k) => format!("E{}", k),
    }
}

fn expr_text(terms: &[TestTerm]) -> String {
    terms
        .iter()
        .map(|t| match t.object {
            Some(o) => format!("P{}({}, {})", t.pred, slot_text(t.subject), slot_text(o)),
            None => format!("P{}({})", t.pred, slot_text(t.subject)),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn uses(terms: &[TestTerm], slot: Slot) -> bool {
    terms
        .iter()
        .any(|t| t.subject == slot || t.object == Some(slot))
}

type Assignment = (Option<EntityId>, Option<EntityId>, Option<EntityId>);

/// Enumerate every assignment of (., X, Y) over the world's ids and keep
/// those satisfying all terms.
fn brute_force(tw: &TestWorld, terms: &[TestTerm]) -> BTreeSet<Assignment> {
    let mut domain: Vec<EntityId> = tw.entities.clone();
    domain.extend(&tw.preds);

    let has_this = uses(terms, Slot::This);
    let has_x = uses(terms, Slot::X);
    let has_y = uses(terms, Slot::Y);

    let options = |used: bool| -> Vec<Option<EntityId>> {
        if used {
            domain.iter().map(|&e| Some(e)).collect()
        } else {
            vec![None]
        }
    };

    let mut results = BTreeSet::new();
    for &this in &options(has_this) {
        for &x in &options(has_x) {
            for &y in &options(has_y) {
                let resolve = |slot: Slot| -> EntityId {
                    match slot {
                        Slot::This => this.unwrap(),
                        Slot::X => x.unwrap(),
                        Slot::Y => y.unwrap(),
                        Slot::Ent(k) => tw.entities[k],
                    }
                };
                let holds = terms.iter().all(|t| {
                    let subject = resolve(t.subject);
                    match t.object {
                        Some(o) => {
                            tw.world
                                .has(subject, pair_id(tw.preds[t.pred], resolve(o)))
                        }
                        None => tw.world.has(subject, tw.preds[t.pred]),
                    }
                });
                if holds {
                    results.insert((this, x, y));
                }
            }
        }
    }
    results
}

/// Run the compiled rule and collect the same assignment tuples.
fn solve(rule: &Rule, terms: &[TestTerm]) -> BTreeSet<Assignment> {
    let has_this = uses(terms, Slot::This);
    let x_var = rule.find_variable("X");
    let y_var = rule.find_variable("Y");

    let mut results = BTreeSet::new();
    let mut it = rule.iter();
    let mut yields = 0;
    while it.next() {
        yields += 1;
        assert!(yields <= MAX_YIELDS, "iterator failed to terminate");

        let x = x_var.map(|v| it.variable(v));
        let y = y_var.map(|v| it.variable(v));
        if has_this {
            for &e in it.entities() {
                results.insert((Some(e), x, y));
            }
        } else {
            results.insert((None, x, y));
        }
    }
    results
}

proptest! {
    /// The compiled program and the brute-force oracle agree on every
    /// satisfying assignment.
    #[test]
    fn solver_matches_brute_force(facts in arb_facts(), terms in arb_terms()) {
        let tw = build_world(&facts);
        let expr = expr_text(&terms);

        let Ok(rule) = Rule::new(&tw.world, &expr) else {
            // Unconstrained-variable rejections are legitimate; nothing
            // to compare.
            return Ok(());
        };

        let expected = brute_force(&tw, &terms);
        let actual = solve(&rule, &terms);
        prop_assert_eq!(actual, expected, "expression: {}", expr);
    }

    /// Structural invariants hold for every compiling expression.
    #[test]
    fn compiled_programs_are_well_formed(facts in arb_facts(), terms in arb_terms()) {
        let tw = build_world(&facts);
        let expr = expr_text(&terms);

        let Ok(rule) = Rule::new(&tw.world, &expr) else {
            return Ok(());
        };

        let ops = rule.operations();
        let count = ops.len() as i32;
        prop_assert_eq!(ops[0].kind, OpKind::Input);
        prop_assert_eq!(ops[0].on_ok, 1);
        prop_assert_eq!(ops[0].on_fail, -1);
        prop_assert_eq!(ops[count as usize - 1].kind, OpKind::Yield);
        prop_assert_eq!(ops[count as usize - 1].on_fail, count - 2);

        for (k, op) in ops.iter().enumerate().skip(1) {
            prop_assert!(op.on_fail < k as i32);
            prop_assert!(op.on_ok == -1 || (op.on_ok > k as i32 && op.on_ok <= count));
        }

        let vars = rule.variables();
        for pair in vars.windows(2) {
            let key = |v: &quarry::solver::Variable| (v.kind, v.depth, std::cmp::Reverse(v.occurs));
            prop_assert!(key(&pair[0]) <= key(&pair[1]));
        }
        for (i, v) in vars.iter().enumerate() {
            prop_assert_eq!(v.id, i);
        }
    }
}

// ----------------------------------------------------------------------
// find_next_match
// ----------------------------------------------------------------------

use quarry::entity::{entity_hi, entity_lo, type_key};
use quarry::solver::{find_next_match, Filter};
use quarry::WILDCARD;

const ID_BASE: u64 = 16;

fn arb_type() -> impl Strategy<Value = Vec<EntityId>> {
    prop::collection::vec(
        prop_oneof![
            (ID_BASE..ID_BASE + 6).prop_map(|id| id as EntityId),
            (ID_BASE..ID_BASE + 6, ID_BASE..ID_BASE + 6)
                .prop_map(|(p, o)| pair_id(p, o)),
        ],
        0..10,
    )
    .prop_map(|mut ids| {
        ids.sort_by_key(|&id| type_key(id));
        ids.dedup();
        ids
    })
}

fn arb_filter() -> impl Strategy<Value = Filter> {
    (
        prop::option::of(ID_BASE..ID_BASE + 6),
        prop::option::of(ID_BASE..ID_BASE + 6),
        any::<bool>(),
    )
        .prop_map(|(pred, obj, unary)| {
            let mut filter = Filter::default();
            let pred_part = match pred {
                Some(p) => p,
                None => {
                    filter.pred_wildcard = true;
                    filter.wildcard = true;
                    WILDCARD
                }
            };
            if unary {
                filter.mask = pred_part;
            } else {
                let obj_part = match obj {
                    Some(o) => o,
                    None => {
                        filter.obj_wildcard = true;
                        filter.wildcard = true;
                        WILDCARD
                    }
                };
                filter.mask = pair_id(pred_part, obj_part);
            }
            filter.set_expr_mask();
            filter
        })
}

proptest! {
    /// Any index returned satisfies the mask probe and lies at or after
    /// the start; with a full scan, it is the first such index.
    #[test]
    fn find_next_match_returns_a_valid_first_match(
        ty in arb_type(),
        filter in arb_filter(),
        start in 0usize..12,
    ) {
        let matches = |id: EntityId| {
            id & filter.expr_mask == filter.expr_match
                && (!filter.same_var || entity_lo(id) == entity_hi(id))
        };

        match find_next_match(&ty, start, &filter) {
            Some(i) => {
                prop_assert!(i >= start);
                prop_assert!(i < ty.len());
                prop_assert!(matches(ty[i]));
                if filter.pred_wildcard || start == 0 {
                    for &id in &ty[start..i] {
                        prop_assert!(!matches(id));
                    }
                }
            }
            None => {
                if filter.pred_wildcard || start == 0 {
                    for &id in ty.get(start..).unwrap_or(&[]) {
                        prop_assert!(!matches(id));
                    }
                }
            }
        }
    }

    /// Reification is idempotent because the halves are pure functions
    /// of the element: packing and unpacking round-trips.
    #[test]
    fn element_halves_round_trip(p in ID_BASE..ID_BASE + 6, o in ID_BASE..ID_BASE + 6) {
        let id = pair_id(p, o);
        prop_assert_eq!(entity_lo(id), p);
        prop_assert_eq!(entity_hi(id), o);
    }
}
