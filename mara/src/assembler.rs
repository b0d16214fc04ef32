//! Label resolution.
//!
//! Two scans: the first records, for every label, the index the next real
//! instruction will have once labels are gone; the second rewrites each
//! label target to that index and drops the label pseudo-instructions.
use std::collections::HashMap;

use crate::bytecode::{Instruction, Target};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AssembleError {
    #[error("label `{0}` is defined more than once")]
    DuplicateLabel(String),
    #[error("jump to unknown label `{0}`")]
    UnknownLabel(String),
}

#[derive(Debug, Default)]
pub struct Assembler {
    labels: HashMap<String, usize>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every label target. Streams without labels come back
    /// unchanged.
    pub fn assemble(
        mut self,
        code: Vec<Instruction>,
    ) -> Result<Vec<Instruction>, AssembleError> {
        self.collect(&code)?;
        let mut out = Vec::with_capacity(code.len() - self.labels.len());
        for mut instr in code {
            if matches!(instr, Instruction::Label { .. }) {
                continue;
            }
            if let Some(target) = instr.target_mut() {
                self.resolve(target)?;
            }
            out.push(instr);
        }
        log::debug!(
            "assembled {} instructions, {} labels resolved",
            out.len(),
            self.labels.len()
        );
        Ok(out)
    }

    fn collect(&mut self, code: &[Instruction]) -> Result<(), AssembleError> {
        let mut index = 0;
        for instr in code {
            match instr {
                Instruction::Label { name } => {
                    if self.labels.insert(name.clone(), index).is_some() {
                        return Err(AssembleError::DuplicateLabel(name.clone()));
                    }
                }
                _ => index += 1,
            }
        }
        Ok(())
    }

    fn resolve(&self, target: &mut Target) -> Result<(), AssembleError> {
        if let Target::Label(name) = target {
            let address = *self
                .labels
                .get(name.as_str())
                .ok_or_else(|| AssembleError::UnknownLabel(name.clone()))?;
            *target = Target::Address(address);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn label(name: &str) -> Instruction {
        Instruction::Label {
            name: name.to_string(),
        }
    }

    #[test]
    fn labels_point_at_the_next_instruction() {
        let code = vec![
            Instruction::Jump {
                target: Target::label("end"),
            },
            label("loop"),
            Instruction::LoadC {
                dst: 1,
                value: Value::Int(1),
            },
            Instruction::BranchZero {
                pred: 1,
                target: Target::label("loop"),
            },
            label("end"),
            Instruction::Halt,
        ];
        let out = Assembler::new().assemble(code).unwrap();
        assert_eq!(
            out,
            vec![
                Instruction::Jump {
                    target: Target::Address(3),
                },
                Instruction::LoadC {
                    dst: 1,
                    value: Value::Int(1),
                },
                Instruction::BranchZero {
                    pred: 1,
                    target: Target::Address(1),
                },
                Instruction::Halt,
            ]
        );
    }

    #[test]
    fn consecutive_labels_share_an_address() {
        let code = vec![
            label("a"),
            label("b"),
            Instruction::Call {
                target: Target::label("b"),
                args: vec![2],
            },
            Instruction::LoadA {
                dst: 1,
                target: Target::label("a"),
            },
        ];
        let out = Assembler::new().assemble(code).unwrap();
        assert_eq!(out[0].target(), Some(&Target::Address(0)));
        assert_eq!(out[1].target(), Some(&Target::Address(0)));
    }

    #[test]
    fn assembling_twice_changes_nothing() {
        let code = vec![
            label("top"),
            Instruction::Jump {
                target: Target::label("top"),
            },
        ];
        let once = Assembler::new().assemble(code).unwrap();
        let twice = Assembler::new().assemble(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn duplicate_label_is_rejected() {
        let code = vec![label("x"), Instruction::Halt, label("x")];
        assert_eq!(
            Assembler::new().assemble(code),
            Err(AssembleError::DuplicateLabel("x".into()))
        );
    }

    #[test]
    fn unknown_label_is_rejected() {
        let code = vec![Instruction::Jump {
            target: Target::label("nowhere"),
        }];
        assert_eq!(
            Assembler::new().assemble(code),
            Err(AssembleError::UnknownLabel("nowhere".into()))
        );
    }
}
