//! Human-readable rule programs.
//!
//! One line per operation, in the form
//! `i: [Pass:a, Fail:b] kind input > output (filter)`. Useful for
//! checking how a rule will be evaluated. The Input placeholder at
//! position 0 is omitted.

use std::fmt;

use crate::entity::EntityId;

use super::emit::OpKind;
use super::vars::VarKind;
use super::Rule;

impl Rule<'_> {
    /// Disassemble the compiled program.
    pub fn program(&self) -> String {
        self.to_string()
    }

    /// Name of a concrete id, falling back to the numeric value.
    fn id_name(&self, id: EntityId) -> String {
        match self.world().name(id) {
            Some(name) => name.to_string(),
            None => id.to_string(),
        }
    }

    /// Display name of a register: variable name with a `t` prefix for
    /// tables, or the constant subject's name.
    fn reg_name(&self, var: Option<usize>, subject: EntityId) -> Option<String> {
        match var {
            Some(v) => {
                let var = &self.variables()[v];
                let prefix = if var.kind == VarKind::Table { "t" } else { "" };
                Some(format!("{}{}", prefix, var.name))
            }
            None if subject != 0 => Some(self.id_name(subject)),
            None => None,
        }
    }
}

impl fmt::Display for Rule<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.operations().iter().enumerate().skip(1) {
            write!(f, "{}: [Pass:{}, Fail:{}] ", i, op.on_ok, op.on_fail)?;

            let (name, has_filter) = match op.kind {
                OpKind::Dfs => ("dfs", true),
                OpKind::Select => ("select", true),
                OpKind::With => ("with  ", true),
                OpKind::Each => ("each  ", false),
                OpKind::Yield => ("yield ", false),
                OpKind::Input => continue,
            };
            write!(f, "{}", name)?;

            if op.has_in {
                if let Some(name) = self.reg_name(op.r_in, op.subject) {
                    write!(f, " {}", name)?;
                }
            }
            if op.has_out {
                if let Some(name) = self.reg_name(op.r_out, op.subject) {
                    write!(f, " > {}", name)?;
                }
            }

            if has_filter {
                let pair = op.param;
                let pred_name = if pair.pred_var {
                    self.variables()[pair.pred as usize].name.clone()
                } else {
                    self.id_name(pair.pred)
                };
                // Unary pairs have a zero, non-variable object slot.
                let object_name = if pair.obj_var {
                    Some(self.variables()[pair.obj as usize].name.clone())
                } else if pair.obj != 0 {
                    Some(self.id_name(pair.obj))
                } else {
                    None
                };

                match object_name {
                    Some(object) => write!(f, " ({}, {})", pred_name, object)?,
                    None => write!(f, " ({})", pred_name)?,
                }
            }

            writeln!(f)?;
        }
        Ok(())
    }
}
