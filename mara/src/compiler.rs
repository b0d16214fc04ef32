//! Lowering from the annotated tree to a flat instruction stream.
//!
//! The input must have been through `CollectNames`, `CollectLocals` and
//! the constant pool. Every node compiles to the register holding its
//! value. Registers come from a monotonic [`Registry`], so each function
//! body owns a contiguous register range, which its prologue saves and
//! its epilogue restores.
//!
//! Function layout:
//!
//! ```text
//!     load_a  rD @f          ; the def evaluates to its address
//!     jump    @f_end
//! f:  reserve <slots>
//!     save    <body registers>
//!     ...body...
//!     copy    r0 rResult
//!     restore <body registers>
//!     ret
//! f_end:
//! ```
use std::fmt;

use crate::ast::{Ast, NodeId, NodeKind};
use crate::attributes::{AttrKey, AttrValue};
use crate::bytecode::{Instruction, RETURN_REG, Reg, Target, disassemble};
use crate::ids::UniqueIds;
use crate::registry::Registry;
use crate::span::Span;
use crate::value::{ArithOp, CompareOp, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
    pub span: Option<Span>,
}

impl CompileError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span: Some(span),
        }
    }

    fn missing(key: AttrKey, ast: &Ast, id: NodeId) -> Self {
        Self::new(
            format!(
                "{} node has no `{key}` annotation",
                ast.kind(id).name()
            ),
            ast.span(id),
        )
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "{span}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for CompileError {}

/// Called with the error and whatever had been emitted when compilation
/// failed.
pub type DumpHook = Box<dyn FnMut(&CompileError, &[Instruction])>;

/// Output of a successful compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub code: Vec<Instruction>,
    /// Holds the module's value once the machine halts.
    pub result: Reg,
}

enum Lowered {
    Arith(ArithOp),
    Compare(CompareOp),
}

fn lower_op(op: &str) -> Option<Lowered> {
    let lowered = match op {
        "+" => Lowered::Arith(ArithOp::Add),
        "-" => Lowered::Arith(ArithOp::Sub),
        "*" => Lowered::Arith(ArithOp::Mul),
        "/" => Lowered::Arith(ArithOp::Div),
        "%" => Lowered::Arith(ArithOp::Rem),
        "<" => Lowered::Compare(CompareOp::Lt),
        "<=" => Lowered::Compare(CompareOp::Lte),
        ">" => Lowered::Compare(CompareOp::Gt),
        ">=" => Lowered::Compare(CompareOp::Gte),
        "==" => Lowered::Compare(CompareOp::Eq),
        "!=" => Lowered::Compare(CompareOp::Neq),
        _ => return None,
    };
    Some(lowered)
}

pub struct Compiler {
    registry: Registry,
    code: Vec<Instruction>,
    ids: UniqueIds,
    /// Enclosing definitions (the module first) with their label prefix.
    definitions: Vec<(NodeId, String)>,
    on_error: Option<DumpHook>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            code: Vec::new(),
            ids: UniqueIds::new(),
            definitions: Vec::new(),
            on_error: None,
        }
    }

    /// Install a hook that receives the partial stream on failure.
    pub fn with_dump_hook(
        mut self,
        hook: impl FnMut(&CompileError, &[Instruction]) + 'static,
    ) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    pub fn compile(mut self, ast: &mut Ast) -> Result<Compiled, CompileError> {
        match self.compile_root(ast) {
            Ok(result) => {
                self.emit(Instruction::Halt);
                log::debug!(
                    "compiled {} instructions, result in r{result}",
                    self.code.len()
                );
                Ok(Compiled {
                    code: self.code,
                    result,
                })
            }
            Err(err) => {
                log::debug!(
                    "compilation failed: {err}\npartial code:\n{}",
                    disassemble(&self.code)
                );
                if let Some(hook) = self.on_error.as_mut() {
                    hook(&err, &self.code);
                }
                Err(err)
            }
        }
    }

    fn compile_root(&mut self, ast: &mut Ast) -> Result<Reg, CompileError> {
        let root = ast.root();
        let NodeKind::Module { name, .. } = ast.kind(root).clone() else {
            return Err(CompileError::new(
                format!("expected a Module, found {}", ast.kind(root).name()),
                ast.span(root),
            ));
        };
        self.assign_addresses(ast, root)?;

        let slots = ast
            .attrs(root)
            .locals()
            .ok_or_else(|| CompileError::missing(AttrKey::Locals, ast, root))?
            .len();
        if slots > 0 {
            self.emit(Instruction::Reserve { size: slots });
        }
        self.definitions.push((root, name));
        self.visit(ast, root)
    }

    /// Give every `Def` its entry label up front, so calls can be emitted
    /// before the callee is compiled.
    fn assign_addresses(
        &mut self,
        ast: &mut Ast,
        id: NodeId,
    ) -> Result<(), CompileError> {
        if let NodeKind::Def { name, .. } = ast.kind(id) {
            let label = self.ids.unique(name);
            let span = ast.span(id);
            ast.attrs_mut(id)
                .set(AttrValue::Address(label))
                .map_err(|err| CompileError::new(err.to_string(), span))?;
        }
        for child in ast.kind(id).children() {
            self.assign_addresses(ast, child)?;
        }
        Ok(())
    }

    // ── emit helpers ───────────────────────────────────────────────

    fn emit(&mut self, instr: Instruction) {
        self.code.push(instr);
    }

    fn fresh(&mut self) -> Reg {
        let mut frame = self.registry.frame();
        frame.get(&mut self.registry, 0)
    }

    fn label(&mut self, suffix: &str) -> String {
        let prefix = self
            .definitions
            .last()
            .map(|(_, prefix)| prefix.as_str())
            .unwrap_or("top");
        format!("{prefix}_{}_{suffix}", self.ids.next_id())
    }

    fn place(&mut self, label: &str) {
        self.emit(Instruction::Label {
            name: label.to_string(),
        });
    }

    // ── name helpers ───────────────────────────────────────────────

    fn resolve(&self, ast: &Ast, id: NodeId) -> Result<NodeId, CompileError> {
        ast.attrs(id)
            .binding()
            .ok_or_else(|| CompileError::missing(AttrKey::Binding, ast, id))
    }

    /// Frame slot of a binding, which must belong to the function being
    /// compiled.
    fn slot(
        &self,
        ast: &Ast,
        decl: NodeId,
        name: &str,
        span: Span,
    ) -> Result<usize, CompileError> {
        let owned = self
            .definitions
            .last()
            .and_then(|&(owner, _)| ast.attrs(owner).locals())
            .is_some_and(|locals| locals.contains_node(decl));
        if !owned {
            return Err(CompileError::new(
                format!(
                    "`{name}` belongs to an enclosing function; \
                     functions cannot capture outer locals"
                ),
                span,
            ));
        }
        ast.attrs(decl)
            .index()
            .ok_or_else(|| CompileError::missing(AttrKey::Index, ast, decl))
    }

    fn address(&self, ast: &Ast, def: NodeId) -> Result<String, CompileError> {
        ast.attrs(def)
            .address()
            .map(str::to_string)
            .ok_or_else(|| CompileError::missing(AttrKey::Address, ast, def))
    }

    // ── nodes ──────────────────────────────────────────────────────

    fn visit(&mut self, ast: &mut Ast, id: NodeId) -> Result<Reg, CompileError> {
        let span = ast.span(id);
        match ast.kind(id).clone() {
            NodeKind::Module { exprs, .. } | NodeKind::Block { exprs } => {
                self.sequence(ast, &exprs, span)
            }
            NodeKind::Def { params, body, .. } => {
                self.def(ast, id, params.len(), body)
            }
            NodeKind::Val { value, .. } | NodeKind::Var { value, .. } => {
                let src = self.visit(ast, value)?;
                let index = ast
                    .attrs(id)
                    .index()
                    .ok_or_else(|| CompileError::missing(AttrKey::Index, ast, id))?;
                self.emit(Instruction::StoreP { src, index });
                Ok(src)
            }
            NodeKind::Assign { name, value } => {
                self.assign(ast, id, &name, value)
            }
            NodeKind::If {
                pred,
                if_body,
                else_body,
            } => self.conditional(ast, pred, if_body, else_body),
            NodeKind::While { pred, body } => self.while_loop(ast, pred, body),
            NodeKind::BinOp { op, args } => {
                let Some(lowered) = lower_op(&op) else {
                    return Err(CompileError::new(
                        format!("BinOp `{op}` is not supported"),
                        span,
                    ));
                };
                let left = self.visit(ast, args[0])?;
                let right = self.visit(ast, args[1])?;
                let dst = self.fresh();
                self.emit(match lowered {
                    Lowered::Arith(op) => Instruction::ArithRR {
                        op,
                        dst,
                        left,
                        right,
                    },
                    Lowered::Compare(op) => Instruction::Compare {
                        op,
                        dst,
                        left,
                        right,
                    },
                });
                Ok(dst)
            }
            NodeKind::Call { func, args, block } => {
                self.call(ast, id, func, &args, block)
            }
            NodeKind::Int(_) | NodeKind::Real(_) | NodeKind::Bool(_) => {
                let index = ast.attrs(id).constant().ok_or_else(|| {
                    CompileError::missing(AttrKey::Constant, ast, id)
                })?;
                let dst = self.fresh();
                self.emit(Instruction::LoadK { dst, index });
                Ok(dst)
            }
            NodeKind::ValueId(name) => self.reference(ast, id, &name),
            NodeKind::Tuple(values) | NodeKind::List(values) => {
                self.chunk(ast, &values)
            }
            NodeKind::Unit | NodeKind::NoOp => {
                let dst = self.fresh();
                self.emit(Instruction::LoadC {
                    dst,
                    value: Value::Null,
                });
                Ok(dst)
            }
            NodeKind::Else { .. } => Err(CompileError::new(
                "`else` without a matching `if`",
                span,
            )),
            kind @ (NodeKind::Param { .. }
            | NodeKind::TypeId(_)
            | NodeKind::SymbolId(_)) => Err(CompileError::new(
                format!("{} node cannot be compiled", kind.name()),
                span,
            )),
        }
    }

    fn sequence(
        &mut self,
        ast: &mut Ast,
        exprs: &[NodeId],
        span: Span,
    ) -> Result<Reg, CompileError> {
        let mut last = None;
        for &expr in exprs {
            if matches!(ast.kind(expr), NodeKind::NoOp) {
                continue;
            }
            last = Some(self.visit(ast, expr)?);
        }
        last.ok_or_else(|| {
            CompileError::new("empty block cannot produce a value", span)
        })
    }

    fn def(
        &mut self,
        ast: &mut Ast,
        id: NodeId,
        arity: usize,
        body: NodeId,
    ) -> Result<Reg, CompileError> {
        let entry = self.address(ast, id)?;
        let skip = format!("{entry}_end");
        let slots = ast
            .attrs(id)
            .locals()
            .ok_or_else(|| CompileError::missing(AttrKey::Locals, ast, id))?
            .len();
        debug_assert!(slots >= arity);

        let mut regs = self.registry.frame();
        let dst = regs.get(&mut self.registry, 0);
        self.emit(Instruction::LoadA {
            dst,
            target: Target::label(&entry),
        });
        self.emit(Instruction::Jump {
            target: Target::label(&skip),
        });
        self.place(&entry);
        self.emit(Instruction::Reserve { size: slots });
        let save_hole = self.code.len();
        self.emit(Instruction::Save { regs: Vec::new() });

        let mark = self.registry.mark();
        self.definitions.push((id, entry));
        let result = self.visit(ast, body)?;
        self.definitions.pop();
        let saved: Vec<Reg> = self.registry.since(mark).collect();

        self.code[save_hole] = Instruction::Save {
            regs: saved.clone(),
        };
        self.emit(Instruction::Copy {
            dst: RETURN_REG,
            src: result,
        });
        self.emit(Instruction::Restore { regs: saved });
        self.emit(Instruction::Ret);
        self.place(&skip);
        Ok(dst)
    }

    fn call(
        &mut self,
        ast: &mut Ast,
        id: NodeId,
        func: NodeId,
        args: &[NodeId],
        block: Option<NodeId>,
    ) -> Result<Reg, CompileError> {
        let span = ast.span(id);
        if block.is_some() {
            return Err(CompileError::new(
                "calls with a block argument are not supported",
                span,
            ));
        }
        let NodeKind::ValueId(name) = ast.kind(func).clone() else {
            return Err(CompileError::new(
                "only named functions can be called",
                span,
            ));
        };
        let decl = self.resolve(ast, func)?;
        let NodeKind::Def { params, .. } = ast.kind(decl) else {
            return Err(CompileError::new(
                format!("`{name}` is not a function"),
                span,
            ));
        };
        if params.len() != args.len() {
            return Err(CompileError::new(
                format!(
                    "`{name}` expects {} arguments, found {}",
                    params.len(),
                    args.len()
                ),
                span,
            ));
        }
        let entry = self.address(ast, decl)?;

        let mut arg_regs = Vec::with_capacity(args.len());
        for &arg in args {
            arg_regs.push(self.visit(ast, arg)?);
        }
        self.emit(Instruction::Call {
            target: Target::label(entry),
            args: arg_regs,
        });
        let dst = self.fresh();
        self.emit(Instruction::Copy {
            dst,
            src: RETURN_REG,
        });
        Ok(dst)
    }

    fn reference(
        &mut self,
        ast: &mut Ast,
        id: NodeId,
        name: &str,
    ) -> Result<Reg, CompileError> {
        let span = ast.span(id);
        let decl = self.resolve(ast, id)?;
        match ast.kind(decl) {
            NodeKind::Val { .. } | NodeKind::Var { .. } | NodeKind::Param { .. } => {
                let index = self.slot(ast, decl, name, span)?;
                let dst = self.fresh();
                self.emit(Instruction::LoadP { dst, index });
                Ok(dst)
            }
            NodeKind::Def { .. } => {
                let entry = self.address(ast, decl)?;
                let dst = self.fresh();
                self.emit(Instruction::LoadA {
                    dst,
                    target: Target::label(entry),
                });
                Ok(dst)
            }
            other => Err(CompileError::new(
                format!("`{name}` names a {} node, not a value", other.name()),
                span,
            )),
        }
    }

    fn assign(
        &mut self,
        ast: &mut Ast,
        id: NodeId,
        name: &str,
        value: NodeId,
    ) -> Result<Reg, CompileError> {
        let span = ast.span(id);
        let decl = self.resolve(ast, id)?;
        let once = match ast.kind(decl) {
            NodeKind::Var { .. } => false,
            NodeKind::Val { value: init, .. } => {
                if !matches!(ast.kind(*init), NodeKind::Unit) {
                    return Err(CompileError::new(
                        format!("cannot reassign val `{name}`"),
                        span,
                    ));
                }
                // checked at run time: only the first assignment that
                // executes may fill the slot
                true
            }
            NodeKind::Param { .. } => {
                return Err(CompileError::new(
                    format!("cannot assign to parameter `{name}`"),
                    span,
                ));
            }
            other => {
                return Err(CompileError::new(
                    format!("cannot assign to {} `{name}`", other.name()),
                    span,
                ));
            }
        };
        let index = self.slot(ast, decl, name, span)?;
        let src = self.visit(ast, value)?;
        self.emit(if once {
            Instruction::StoreOnce { src, index }
        } else {
            Instruction::StoreP { src, index }
        });
        Ok(src)
    }

    fn conditional(
        &mut self,
        ast: &mut Ast,
        pred: NodeId,
        if_body: NodeId,
        else_body: NodeId,
    ) -> Result<Reg, CompileError> {
        let pred = self.visit(ast, pred)?;
        let else_label = self.label("else");
        let end_label = self.label("end");

        // Patched with the two branch registers once they are known.
        let unset_hole = self.code.len();
        self.emit(Instruction::Unset { regs: Vec::new() });
        self.emit(Instruction::BranchZero {
            pred,
            target: Target::label(&else_label),
        });
        let then = self.visit(ast, if_body)?;
        self.emit(Instruction::Jump {
            target: Target::label(&end_label),
        });
        self.place(&else_label);
        let otherwise = self.visit(ast, else_body)?;
        self.place(&end_label);
        self.code[unset_hole] = Instruction::Unset {
            regs: vec![then, otherwise],
        };

        let dst = self.fresh();
        self.emit(Instruction::Phi {
            dst,
            left: then,
            right: otherwise,
        });
        Ok(dst)
    }

    fn while_loop(
        &mut self,
        ast: &mut Ast,
        pred: NodeId,
        body: NodeId,
    ) -> Result<Reg, CompileError> {
        let begin = self.label("begin");
        let end = self.label("end");
        self.place(&begin);
        let pred = self.visit(ast, pred)?;
        self.emit(Instruction::BranchZero {
            pred,
            target: Target::label(&end),
        });
        self.visit(ast, body)?;
        self.emit(Instruction::Jump {
            target: Target::label(&begin),
        });
        self.place(&end);
        let dst = self.fresh();
        self.emit(Instruction::LoadC {
            dst,
            value: Value::Null,
        });
        Ok(dst)
    }

    /// Tuples and lists live on the heap; the value is the chunk address.
    fn chunk(
        &mut self,
        ast: &mut Ast,
        values: &[NodeId],
    ) -> Result<Reg, CompileError> {
        let mut regs = Vec::with_capacity(values.len());
        for &value in values {
            regs.push(self.visit(ast, value)?);
        }
        let ptr = self.fresh();
        self.emit(Instruction::NewChunk {
            dst: ptr,
            size: regs.len(),
        });
        for (offset, src) in regs.into_iter().enumerate() {
            self.emit(Instruction::StoreI { ptr, offset, src });
        }
        Ok(ptr)
    }
}
