//! End-to-end rule evaluation scenarios.

use quarry::{EntityId, Rule, World};

/// Entities Alice, Bob, Carol; `Knows` transitive; facts
/// `Alice Knows Bob`, `Bob Knows Carol`, `Alice Eats Apple`,
/// `Bob Eats Apple`.
struct Fixture {
    world: World,
    alice: EntityId,
    bob: EntityId,
    carol: EntityId,
    apple: EntityId,
}

fn fixture() -> Fixture {
    let mut world = World::new();
    let knows = world.entity("Knows");
    world.make_transitive(knows);
    let eats = world.entity("Eats");
    let apple = world.entity("Apple");
    let alice = world.entity("Alice");
    let bob = world.entity("Bob");
    let carol = world.entity("Carol");

    world.add_pair(alice, knows, bob);
    world.add_pair(bob, knows, carol);
    world.add_pair(alice, eats, apple);
    world.add_pair(bob, eats, apple);

    Fixture {
        world,
        alice,
        bob,
        carol,
        apple,
    }
}

/// All yielded entities, in order.
fn collect_entities(rule: &Rule) -> Vec<EntityId> {
    let mut out = Vec::new();
    let mut it = rule.iter();
    while it.next() {
        out.extend_from_slice(it.entities());
    }
    out
}

#[test]
fn transitive_rule_with_concrete_object() {
    let f = fixture();
    let rule = Rule::new(&f.world, "Knows(., Bob)").unwrap();

    assert!(rule.operations().len() >= 3);
    assert_eq!(collect_entities(&rule), vec![f.alice]);
}

#[test]
fn transitive_rule_with_variable_object_yields_the_closure() {
    let f = fixture();
    let rule = Rule::new(&f.world, "Knows(., X)").unwrap();

    assert_eq!(rule.variable_count(), 2);
    let x = rule.find_variable("X").expect("X is declared");
    assert!(rule.variable_is_entity(x));

    let mut pairs = Vec::new();
    let mut it = rule.iter();
    while it.next() {
        for &e in it.entities() {
            pairs.push((e, it.variable(x)));
        }
    }

    assert_eq!(
        pairs,
        vec![
            (f.alice, f.bob),
            (f.bob, f.carol),
            (f.alice, f.carol),
        ]
    );
}

#[test]
fn conjunction_backtracks_over_the_bound_table() {
    let f = fixture();
    let rule = Rule::new(&f.world, "Eats(., Apple), Knows(., Bob)").unwrap();

    // Alice's table passes both filters; Bob's table passes the first
    // but fails the second, including its transitive fallback.
    assert_eq!(collect_entities(&rule), vec![f.alice]);
}

#[test]
fn chained_variables_yield_the_joining_assignment() {
    let f = fixture();
    let rule = Rule::new(&f.world, "Knows(X, Y), Knows(Y, Z)").unwrap();

    let x = rule.find_variable("X").unwrap();
    let y = rule.find_variable("Y").unwrap();
    let z = rule.find_variable("Z").unwrap();

    let mut results = Vec::new();
    let mut it = rule.iter();
    while it.next() {
        // No `.` variable: the yield carries no entities of its own.
        assert_eq!(it.count(), 0);
        results.push((it.variable(x), it.variable(y), it.variable(z)));
    }

    assert_eq!(results, vec![(f.alice, f.bob, f.carol)]);
}

#[test]
fn unreachable_subject_fails_compilation() {
    let f = fixture();
    let err = Rule::new(&f.world, "Knows(X, Y), Eats(Z, Apple)").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("unconstrained variable 'Z'"), "{}", msg);
    assert!(msg.contains("Knows(X, Y), Eats(Z, Apple)"), "{}", msg);
}

#[test]
fn empty_world_yields_nothing() {
    let world = World::new();
    let rule = Rule::new(&world, "Knows(., X)").unwrap();
    let mut it = rule.iter();
    assert!(!it.next());
    assert!(!it.next());
}

#[test]
fn ground_rule_yields_exactly_once_when_it_holds() {
    let f = fixture();
    let rule = Rule::new(&f.world, "Eats(Alice, Apple)").unwrap();

    let mut it = rule.iter();
    assert!(it.next());
    assert_eq!(it.count(), 0);
    assert!(!it.next());
}

#[test]
fn ground_rule_yields_nothing_when_it_fails() {
    let f = fixture();
    let rule = Rule::new(&f.world, "Eats(Carol, Apple)").unwrap();

    let mut it = rule.iter();
    assert!(!it.next());
}

#[test]
fn ground_conjunction_never_yields_twice() {
    let f = fixture();
    let rule = Rule::new(&f.world, "Eats(Alice, Apple), Eats(Bob, Apple)").unwrap();

    let mut yields = 0;
    let mut it = rule.iter();
    while it.next() {
        yields += 1;
    }
    assert_eq!(yields, 1);
}

#[test]
fn constant_subject_reifies_object_variables() {
    let f = fixture();
    let rule = Rule::new(&f.world, "Eats(Alice, X)").unwrap();
    let x = rule.find_variable("X").unwrap();

    let mut values = Vec::new();
    let mut it = rule.iter();
    while it.next() {
        values.push(it.variable(x));
    }
    assert_eq!(values, vec![f.apple]);
}

#[test]
fn single_term_returns_every_matching_table() {
    let f = fixture();
    let rule = Rule::new(&f.world, "Eats(., Apple)").unwrap();
    assert_eq!(collect_entities(&rule), vec![f.alice, f.bob]);
}

#[test]
fn unary_predicate_variable_matches_plain_ids() {
    // `Knows` carries the builtin transitive marker as a plain id, so a
    // unary term with a predicate variable finds it.
    let f = fixture();
    let rule = Rule::new(&f.world, "P(Knows)").unwrap();
    let p = rule.find_variable("P").unwrap();

    let mut values = Vec::new();
    let mut it = rule.iter();
    while it.next() {
        values.push(it.variable(p));
    }
    assert_eq!(values, vec![quarry::TRANSITIVE]);
}

#[test]
fn transitive_cycle_terminates() {
    let mut world = World::new();
    let knows = world.entity("Knows");
    world.make_transitive(knows);
    let a = world.entity("A");
    let b = world.entity("B");
    world.add_pair(a, knows, b);
    world.add_pair(b, knows, a);

    let rule = Rule::new(&world, "Knows(., A)").unwrap();
    // Direct: B Knows A. Transitive: A Knows B Knows A. The cycle must
    // not replay either result.
    assert_eq!(collect_entities(&rule), vec![b, a]);
}

#[test]
fn this_as_object_of_a_constant_subject() {
    let f = fixture();
    // Who does Alice know: `.` is bound per reified object.
    let rule = Rule::new(&f.world, "Knows(Alice, .)").unwrap();
    assert_eq!(collect_entities(&rule), vec![f.bob]);
}

#[test]
fn same_variable_in_predicate_and_object_requires_equal_halves() {
    let mut world = World::new();
    let p = world.entity("P");
    let q = world.entity("Q");
    let e = world.entity("E");
    world.add_pair(e, p, q);
    world.add_pair(e, p, p);

    let rule = Rule::new(&world, "X(E, X)").unwrap();
    let x = rule.find_variable("X").unwrap();

    let mut values = Vec::new();
    let mut it = rule.iter();
    while it.next() {
        values.push(it.variable(x));
    }
    assert_eq!(values, vec![p]);
}

#[test]
fn matched_ids_and_columns_are_published() {
    let f = fixture();
    let rule = Rule::new(&f.world, "Eats(., Apple), Knows(., Bob)").unwrap();
    let eats = f.world.lookup("Eats").unwrap();
    let knows = f.world.lookup("Knows").unwrap();

    let mut it = rule.iter();
    assert!(it.next());
    assert_eq!(it.matched_ids().len(), 2);
    assert_eq!(
        it.matched_ids()[0],
        quarry::entity::pair_id(eats, f.apple)
    );
    assert_eq!(it.matched_ids()[1], quarry::entity::pair_id(knows, f.bob));
    // Column indices are published 1-based.
    assert!(it.columns().iter().all(|&c| c >= 1));
    assert!(!it.next());
}

#[test]
fn shared_object_joins_two_subjects() {
    let f = fixture();
    // Both Alice and Bob eat an apple; who shares a meal with whom?
    let rule = Rule::new(&f.world, "Eats(X, V), Eats(Y, V)").unwrap();
    let x = rule.find_variable("X").unwrap();
    let y = rule.find_variable("Y").unwrap();

    let mut pairs = std::collections::BTreeSet::new();
    let mut it = rule.iter();
    while it.next() {
        pairs.insert((it.variable(x), it.variable(y)));
    }

    let expected: std::collections::BTreeSet<_> = [
        (f.alice, f.alice),
        (f.alice, f.bob),
        (f.bob, f.alice),
        (f.bob, f.bob),
    ]
    .into_iter()
    .collect();
    assert_eq!(pairs, expected);
}
