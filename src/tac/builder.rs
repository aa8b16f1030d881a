use log::{debug, trace};

use crate::{
    ast::{Block, Decl, Expr, ExprKind, FuncDecl, LValue, Program, Stmt},
    common::NameGen,
    symbol::{SymbolId, SymbolTable, Type},
};

use super::{BinOp, Error, Instruction, OpCode, OperandId, Operands, Tag, UnOp};

type Result<T> = std::result::Result<T, Error>;

/// A global variable and its initial value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Global {
    pub symbol: SymbolId,
    pub init: i64,
}

/// The flat instruction table of a compilation unit.
#[derive(Debug, Clone, Default)]
pub struct Tac {
    pub instrs: Vec<Instruction>,
    pub operands: Operands,
    pub globals: Vec<Global>,
}

#[derive(Debug, Clone, Copy)]
struct LoopContext {
    update: OperandId,
    end: OperandId,
}

#[derive(Debug, Clone, Copy)]
struct FunctionContext {
    rv: OperandId,
}

/// Lowers a checked program into three-address code.
pub struct TacBuilder<'a> {
    symbols: &'a SymbolTable,
    names: NameGen,
    tac: Tac,
    loops: Vec<LoopContext>,
    function: Option<FunctionContext>,
}

impl<'a> TacBuilder<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Self {
            symbols,
            names: NameGen::new(),
            tac: Tac::default(),
            loops: Vec::new(),
            function: None,
        }
    }

    pub fn build(mut self, program: &Program) -> Result<Tac> {
        for decl in &program.decls {
            match decl {
                Decl::Func(func) => self.lower_function(func)?,
                Decl::Global { symbol, init } => {
                    let init = match init {
                        Some(expr) => expr.literal().ok_or_else(|| {
                            Error::NonLiteralGlobal(self.symbols[*symbol].name.clone())
                        })?,
                        None => 0,
                    };
                    self.tac.globals.push(Global {
                        symbol: *symbol,
                        init,
                    });
                }
            }
        }

        debug!(
            "lowered {} instructions, {} operands",
            self.tac.instrs.len(),
            self.tac.operands.len()
        );
        Ok(self.tac)
    }

    fn emit(
        &mut self,
        op: OpCode,
        result: Option<OperandId>,
        left: Option<OperandId>,
        right: Option<OperandId>,
    ) -> usize {
        let id = self.tac.instrs.len();
        self.tac
            .instrs
            .push(Instruction::new(id, op, result, left, right));
        id
    }

    fn symbol(&mut self, id: SymbolId) -> OperandId {
        self.tac.operands.symbol(id, &self.symbols[id])
    }

    fn new_temp(&mut self, tag: Tag) -> OperandId {
        let temp = self.names.temp();
        self.tac.operands.temp(temp, tag)
    }

    fn new_label(&mut self) -> OperandId {
        let label = self.names.label();
        self.tac.operands.label(label)
    }

    fn place_label(&mut self, label: OperandId) {
        self.emit(OpCode::Label, None, Some(label), None);
    }

    fn jump(&mut self, label: OperandId) {
        self.emit(OpCode::Jump, None, Some(label), None);
    }

    fn ends_in_transfer(&self) -> bool {
        self.tac
            .instrs
            .last()
            .map_or(false, Instruction::is_transfer)
    }

    fn lower_function(&mut self, func: &FuncDecl) -> Result<()> {
        let start = self.tac.instrs.len();
        let name = self.symbol(func.symbol);
        self.emit(OpCode::Name, Some(name), None, None);

        for (index, &param) in func.params.iter().enumerate() {
            let incoming = self.new_temp(Tag::Param(index));
            let param = self.symbol(param);
            self.emit(OpCode::Param(index), Some(param), Some(incoming), None);
        }

        let rv = self.new_temp(Tag::ReturnValue);
        self.function = Some(FunctionContext { rv });
        let lowered = self.lower_block(&func.body);
        self.function = None;
        lowered?;

        if !matches!(self.tac.instrs.last(), Some(instr) if instr.op == OpCode::Return) {
            self.emit(OpCode::Return, None, None, None);
        }

        debug!(
            "lowered function `{}` into {} instructions",
            self.symbols[func.symbol].name,
            self.tac.instrs.len() - start
        );
        Ok(())
    }

    fn lower_block(&mut self, block: &Block) -> Result<()> {
        for stmt in block {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Local(symbol, init) => {
                if let Some(init) = init {
                    let value = self.value(init, "local initializer")?;
                    let local = self.symbol(*symbol);
                    self.emit(OpCode::Assign, Some(local), Some(value), None);
                }
            }
            Stmt::Assign(LValue::Var(symbol), expr) => {
                let value = self.value(expr, "assignment")?;
                let var = self.symbol(*symbol);
                self.emit(OpCode::Assign, Some(var), Some(value), None);
            }
            Stmt::Assign(LValue::Index(array, index), expr) => {
                let value = self.value(expr, "array store")?;
                let addr = self.element_address(*array, index)?;
                self.emit(OpCode::Store, None, Some(addr), Some(value));
            }
            Stmt::Expr(expr) => {
                self.lower_expr(expr)?;
            }
            Stmt::If { branches, els } => self.lower_if(branches, els.as_ref())?,
            Stmt::While(cond, body) => self.lower_loop(None, Some(cond), None, body)?,
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => self.lower_loop(init.as_deref(), cond.as_ref(), update.as_deref(), body)?,
            Stmt::Break => {
                let ctx = self
                    .loops
                    .last()
                    .copied()
                    .ok_or(Error::LoopControlOutsideLoop("break"))?;
                self.jump(ctx.end);
            }
            Stmt::Continue => {
                let ctx = self
                    .loops
                    .last()
                    .copied()
                    .ok_or(Error::LoopControlOutsideLoop("continue"))?;
                self.jump(ctx.update);
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => Some(self.value(expr, "return value")?),
                    None => None,
                };
                let rv = self
                    .function
                    .map(|ctx| ctx.rv)
                    .ok_or(Error::MissingOperand("return value slot"))?;
                match value {
                    Some(value) => {
                        self.emit(OpCode::Assign, Some(rv), Some(value), None);
                        self.emit(OpCode::Return, None, Some(rv), None);
                    }
                    None => {
                        self.emit(OpCode::Return, None, None, None);
                    }
                }
            }
            Stmt::Block(block) => self.lower_block(block)?,
        }
        Ok(())
    }

    // cond0 ? body0 : cond1 ? body1 : ... : els
    //
    //     if !c0 goto next0
    //     body0
    //     goto end
    // next0:
    //     if !c1 goto end      (last arm, no else)
    //     body1
    // end:
    fn lower_if(&mut self, branches: &[(Expr, Block)], els: Option<&Block>) -> Result<()> {
        let end = self.new_label();

        for (index, (cond, body)) in branches.iter().enumerate() {
            let last = index + 1 == branches.len() && els.is_none();
            let next = if last { end } else { self.new_label() };

            let cond = self.value(cond, "branch condition")?;
            self.emit(OpCode::BranchIfFalse, None, Some(cond), Some(next));
            self.lower_block(body)?;

            if !last {
                if !self.ends_in_transfer() {
                    self.jump(end);
                }
                self.place_label(next);
            }
        }

        if let Some(els) = els {
            self.lower_block(els)?;
        }
        self.place_label(end);
        Ok(())
    }

    //     init
    // start:
    //     if !cond goto end
    //     body
    // update:
    //     update
    //     goto start
    // end:
    fn lower_loop(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        update: Option<&Stmt>,
        body: &Block,
    ) -> Result<()> {
        if let Some(init) = init {
            self.lower_stmt(init)?;
        }

        let start = self.new_label();
        let update_label = self.new_label();
        let end = self.new_label();

        self.place_label(start);
        if let Some(cond) = cond {
            let cond = self.value(cond, "loop condition")?;
            self.emit(OpCode::BranchIfFalse, None, Some(cond), Some(end));
        }

        self.loops.push(LoopContext {
            update: update_label,
            end,
        });
        let lowered = self.lower_block(body);
        self.loops.pop();
        lowered?;

        self.place_label(update_label);
        if let Some(update) = update {
            self.lower_stmt(update)?;
        }
        self.jump(start);
        self.place_label(end);
        Ok(())
    }

    /// Lowers `expr` and requires that it produced something.
    fn value(&mut self, expr: &Expr, what: &'static str) -> Result<OperandId> {
        self.lower_expr(expr)?.ok_or(Error::MissingOperand(what))
    }

    fn lower_expr(&mut self, expr: &Expr) -> Result<Option<OperandId>> {
        let operand = match &expr.kind {
            ExprKind::Int(_) | ExprKind::Bool(_) | ExprKind::Char(_) => {
                let value = expr.literal().ok_or(Error::MissingOperand("literal"))?;
                self.tac.operands.int(value)
            }
            ExprKind::Name(symbol) => self.symbol(*symbol),
            ExprKind::Binary(op, lhs, rhs) => {
                let lhs = self.value(lhs, "left operand")?;
                let rhs = self.value(rhs, "right operand")?;

                let (op, tag) = OpCode::binary(*op);

                let result = self.new_temp(tag);
                self.emit(op, Some(result), Some(lhs), Some(rhs));
                result
            }
            ExprKind::Unary(op, operand) => {
                let operand = self.value(operand, "unary operand")?;
                let op = UnOp::from(*op);
                let result = self.new_temp(Tag::Unary(op));
                self.emit(OpCode::Unary(op), Some(result), Some(operand), None);
                result
            }
            ExprKind::Call(func, args) => return self.lower_call(*func, args, &expr.ty),
            ExprKind::Index(array, index) => {
                let addr = self.element_address(*array, index)?;
                let result = self.new_temp(Tag::Load);
                self.emit(OpCode::Deref, Some(result), Some(addr), None);
                result
            }
        };
        Ok(Some(operand))
    }

    fn lower_call(
        &mut self,
        func: SymbolId,
        args: &[Expr],
        ty: &Type,
    ) -> Result<Option<OperandId>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.value(arg, "call argument")?);
        }

        let mut marshaled = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            let arg = self.new_temp(Tag::Arg(index));
            self.emit(OpCode::Arg(index), Some(arg), Some(value), None);
            marshaled.push(arg);
        }

        let callee = self.symbol(func);
        let returned = match ty {
            Type::Void => None,
            _ => Some(self.new_temp(Tag::CallResult)),
        };
        let call = self.emit(OpCode::Call, returned, Some(callee), None);
        self.tac.instrs[call].args = marshaled;
        trace!(
            "call to `{}` with {} arguments",
            self.symbols[func].name,
            args.len()
        );

        Ok(match returned {
            Some(returned) => {
                let result = self.new_temp(Tag::Copy);
                self.emit(OpCode::Assign, Some(result), Some(returned), None);
                Some(result)
            }
            None => None,
        })
    }

    /// `&array + index * sizeof(element)`
    fn element_address(&mut self, array: SymbolId, index: &Expr) -> Result<OperandId> {
        let size = self.symbols[array]
            .ty
            .element()
            .map_or(Type::WORD_SIZE, Type::size);

        let index = self.value(index, "array index")?;
        let size = self.tac.operands.int(size as i64);
        let offset = self.new_temp(Tag::Offset);
        self.emit(
            OpCode::Binary(BinOp::Mul),
            Some(offset),
            Some(index),
            Some(size),
        );

        let base = self.symbol(array);
        let addr = self.new_temp(Tag::Address);
        self.emit(OpCode::Address, Some(addr), Some(base), Some(offset));
        Ok(addr)
    }
}
