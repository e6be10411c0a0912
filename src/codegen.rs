use std::collections::HashMap;

use inkwell::builder::{Builder, BuilderError};
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::values::{
    BasicMetadataValueEnum, FloatValue, FunctionValue, PointerValue, ValueKind,
};
use inkwell::FloatPredicate;
use thiserror::Error;

use crate::ast::{Expr, Function, Item, Prototype};

#[derive(Debug, Error)]
pub enum CodeGenError {
    #[error("unknown variable '{0}'")]
    UnknownSymbol(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' expects {expected} argument(s), found {found}")]
    ArityMismatch {
        name: String,
        expected: u32,
        found: u32,
    },
    #[error("conflicting signature for '{name}': declared with {expected} parameter(s), redeclared with {found}")]
    SignatureConflict {
        name: String,
        expected: u32,
        found: u32,
    },
    #[error("function '{0}' is already defined")]
    Redefinition(String),
    #[error("unknown operator '{0}'")]
    UnknownOperator(char),
    #[error("destination of '=' must be a variable")]
    InvalidAssignment,
    #[error("generated function '{0}' failed verification")]
    Verification(String),
    #[error(transparent)]
    Backend(#[from] BuilderError),
}

/// Tree-walking code generator: one depth-first pass per top-level item,
/// emitting LLVM IR through inkwell. Every value in the language is a
/// double, so the whole module is `double`-typed; variables live in
/// entry-block stack slots tracked by `variables` for the duration of the
/// function being generated.
pub struct Compiler<'ctx> {
    context: &'ctx Context,
    builder: Builder<'ctx>,
    module: Module<'ctx>,
    variables: HashMap<String, PointerValue<'ctx>>,
}

impl<'ctx> Compiler<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        let builder = context.create_builder();
        let module = context.create_module("kscope");
        Self {
            context,
            builder,
            module,
            variables: HashMap::new(),
        }
    }

    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    /// The IR emitted so far, as text.
    pub fn ir(&self) -> String {
        self.module.print_to_string().to_string()
    }

    pub fn compile_item(&mut self, item: &Item) -> Result<FunctionValue<'ctx>, CodeGenError> {
        match item {
            Item::Definition(func) | Item::Expression(func) => self.compile_function(func),
            Item::Extern(proto) => self.compile_prototype(proto),
        }
    }

    /// Declares `double (double, ...)` for the prototype, or returns the
    /// existing function when one with the same name and arity is already
    /// known. The module's symbol table is the single source of truth for
    /// signatures.
    pub fn compile_prototype(
        &mut self,
        proto: &Prototype,
    ) -> Result<FunctionValue<'ctx>, CodeGenError> {
        if let Some(existing) = self.module.get_function(&proto.name) {
            let expected = existing.count_params();
            let found = proto.params.len() as u32;
            if expected != found {
                return Err(CodeGenError::SignatureConflict {
                    name: proto.name.clone(),
                    expected,
                    found,
                });
            }
            return Ok(existing);
        }
        Ok(self.declare_function(&proto.name, &proto.params))
    }

    /// Generates a full definition. A declared-only prototype (from a prior
    /// `extern`) is completed in place; a function that already has a body
    /// cannot be redefined.
    pub fn compile_function(&mut self, func: &Function) -> Result<FunctionValue<'ctx>, CodeGenError> {
        let proto = &func.proto;
        let existed_before = self.module.get_function(&proto.name).is_some();
        let function = self.compile_prototype(proto)?;
        if function.count_basic_blocks() > 0 {
            return Err(CodeGenError::Redefinition(proto.name.clone()));
        }

        let result = self.compile_function_body(function, func);
        // The scope dies with the function either way.
        self.variables.clear();

        match result {
            Ok(()) => Ok(function),
            Err(err) => {
                // Drop the partial body so the module stays well-formed for
                // the next unit; a prior extern declaration is re-created.
                unsafe { function.delete() };
                if existed_before {
                    self.declare_function(&proto.name, &proto.params);
                }
                Err(err)
            }
        }
    }

    fn compile_function_body(
        &mut self,
        function: FunctionValue<'ctx>,
        func: &Function,
    ) -> Result<(), CodeGenError> {
        let entry = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);

        // Arguments become mutable stack slots in a fresh scope.
        self.variables.clear();
        for (i, param_name) in func.proto.params.iter().enumerate() {
            let param = function.get_nth_param(i as u32).unwrap().into_float_value();
            param.set_name(param_name);
            let slot = self.create_entry_block_alloca(function, param_name)?;
            self.builder.build_store(slot, param)?;
            self.variables.insert(param_name.clone(), slot);
        }

        let value = self.compile_expr(&func.body)?;
        self.builder.build_return(Some(&value))?;

        if function.verify(true) {
            Ok(())
        } else {
            Err(CodeGenError::Verification(func.proto.name.clone()))
        }
    }

    fn declare_function(&self, name: &str, params: &[String]) -> FunctionValue<'ctx> {
        let f64_type = self.context.f64_type();
        let param_types: Vec<_> = params.iter().map(|_| f64_type.into()).collect();
        let fn_type = f64_type.fn_type(&param_types, false);
        let function = self.module.add_function(name, fn_type, None);
        for (param, param_name) in function.get_param_iter().zip(params) {
            param.into_float_value().set_name(param_name);
        }
        function
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<FloatValue<'ctx>, CodeGenError> {
        match expr {
            Expr::Number(value) => Ok(self.context.f64_type().const_float(*value)),
            Expr::Variable(name) => {
                let slot = self
                    .variables
                    .get(name)
                    .copied()
                    .ok_or_else(|| CodeGenError::UnknownSymbol(name.clone()))?;
                let value = self.builder.build_load(slot, name)?;
                Ok(value.into_float_value())
            }
            Expr::Unary { op, operand } => self.compile_unary(*op, operand),
            Expr::Binary { op, lhs, rhs } => self.compile_binary(*op, lhs, rhs),
            Expr::Call { callee, args } => self.compile_call(callee, args),
            Expr::If {
                cond,
                then_expr,
                else_expr,
            } => self.compile_if(cond, then_expr, else_expr),
            Expr::For {
                var,
                start,
                end,
                step,
                body,
            } => self.compile_for(var, start, end, step, body),
            Expr::VarIn { bindings, body } => self.compile_var_in(bindings, body),
        }
    }

    /// There are no built-in unary operators; a unary application is a call
    /// to the operator's `"unary" + char` function.
    fn compile_unary(&mut self, op: char, operand: &Expr) -> Result<FloatValue<'ctx>, CodeGenError> {
        let operand = self.compile_expr(operand)?;
        let function = self
            .module
            .get_function(&format!("unary{}", op))
            .ok_or(CodeGenError::UnknownOperator(op))?;
        self.emit_call(function, &[operand], "unop")
    }

    fn compile_binary(
        &mut self,
        op: char,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<FloatValue<'ctx>, CodeGenError> {
        // Assignment is special-cased before operand evaluation: the left
        // side is a binding name, not a value to compute.
        if op == '=' {
            return self.compile_assignment(lhs, rhs);
        }

        let lhs = self.compile_expr(lhs)?;
        let rhs = self.compile_expr(rhs)?;

        match op {
            '+' => Ok(self.builder.build_float_add(lhs, rhs, "addtmp")?),
            '-' => Ok(self.builder.build_float_sub(lhs, rhs, "subtmp")?),
            '*' => Ok(self.builder.build_float_mul(lhs, rhs, "multmp")?),
            '<' => {
                let cmp = self
                    .builder
                    .build_float_compare(FloatPredicate::ULT, lhs, rhs, "cmptmp")?;
                // Booleans are numeric truthiness: widen i1 to 0.0 / 1.0.
                Ok(self.builder.build_unsigned_int_to_float(
                    cmp,
                    self.context.f64_type(),
                    "booltmp",
                )?)
            }
            _ => {
                let function = self
                    .module
                    .get_function(&format!("binary{}", op))
                    .ok_or(CodeGenError::UnknownOperator(op))?;
                self.emit_call(function, &[lhs, rhs], "binop")
            }
        }
    }

    fn compile_assignment(
        &mut self,
        target: &Expr,
        value: &Expr,
    ) -> Result<FloatValue<'ctx>, CodeGenError> {
        let name = match target {
            Expr::Variable(name) => name,
            _ => return Err(CodeGenError::InvalidAssignment),
        };
        let value = self.compile_expr(value)?;
        let slot = self
            .variables
            .get(name)
            .copied()
            .ok_or_else(|| CodeGenError::UnknownSymbol(name.clone()))?;
        self.builder.build_store(slot, value)?;
        // The stored value is the value of the whole expression.
        Ok(value)
    }

    fn compile_call(
        &mut self,
        callee: &str,
        args: &[Expr],
    ) -> Result<FloatValue<'ctx>, CodeGenError> {
        let function = self
            .module
            .get_function(callee)
            .ok_or_else(|| CodeGenError::UnknownFunction(callee.to_string()))?;

        let expected = function.count_params();
        if expected as usize != args.len() {
            return Err(CodeGenError::ArityMismatch {
                name: callee.to_string(),
                expected,
                found: args.len() as u32,
            });
        }

        // Arguments evaluate left to right; the order is observable through
        // assignments to `var` slots.
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.compile_expr(arg)?);
        }
        self.emit_call(function, &values, "calltmp")
    }

    fn compile_if(
        &mut self,
        cond: &Expr,
        then_expr: &Expr,
        else_expr: &Expr,
    ) -> Result<FloatValue<'ctx>, CodeGenError> {
        let parent = self.current_function();

        // Truthiness: anything not equal to 0.0 takes the then-branch.
        let cond_value = self.compile_expr(cond)?;
        let zero = self.context.f64_type().const_float(0.0);
        let cond_bool =
            self.builder
                .build_float_compare(FloatPredicate::ONE, cond_value, zero, "ifcond")?;

        let then_bb = self.context.append_basic_block(parent, "then");
        let else_bb = self.context.append_basic_block(parent, "else");
        let merge_bb = self.context.append_basic_block(parent, "ifcont");

        self.builder
            .build_conditional_branch(cond_bool, then_bb, else_bb)?;

        self.builder.position_at_end(then_bb);
        let then_value = self.compile_expr(then_expr)?;
        self.builder.build_unconditional_branch(merge_bb)?;
        // Nested constructs move the insertion point; the phi needs the
        // block that actually flows into the merge.
        let then_end = self.builder.get_insert_block().unwrap();

        self.builder.position_at_end(else_bb);
        let else_value = self.compile_expr(else_expr)?;
        self.builder.build_unconditional_branch(merge_bb)?;
        let else_end = self.builder.get_insert_block().unwrap();

        self.builder.position_at_end(merge_bb);
        let phi = self.builder.build_phi(self.context.f64_type(), "iftmp")?;
        phi.add_incoming(&[(&then_value, then_end), (&else_value, else_end)]);
        Ok(phi.as_basic_value().into_float_value())
    }

    /// Loop with a mutable induction variable that shadows any outer binding
    /// of the same name. The condition `current < end` is tested before
    /// every iteration, so a loop whose start is not below its end never
    /// runs its body; the step is added after the body. End and step are
    /// re-evaluated each time around. The loop itself evaluates to 0.0.
    fn compile_for(
        &mut self,
        var: &str,
        start: &Expr,
        end: &Expr,
        step: &Expr,
        body: &Expr,
    ) -> Result<FloatValue<'ctx>, CodeGenError> {
        let parent = self.current_function();

        // The start value belongs to the enclosing scope, before the
        // induction variable shadows anything.
        let start_value = self.compile_expr(start)?;
        let slot = self.create_entry_block_alloca(parent, var)?;
        self.builder.build_store(slot, start_value)?;

        let cond_bb = self.context.append_basic_block(parent, "loopcond");
        let body_bb = self.context.append_basic_block(parent, "loopbody");
        let after_bb = self.context.append_basic_block(parent, "afterloop");

        self.builder.build_unconditional_branch(cond_bb)?;

        let names = [var.to_string()];
        self.with_restored_bindings(&names, |this| {
            this.variables.insert(var.to_string(), slot);

            this.builder.position_at_end(cond_bb);
            let current = this
                .builder
                .build_load(slot, var)?
                .into_float_value();
            let end_value = this.compile_expr(end)?;
            let keep_going = this.builder.build_float_compare(
                FloatPredicate::ULT,
                current,
                end_value,
                "loopcond",
            )?;
            this.builder
                .build_conditional_branch(keep_going, body_bb, after_bb)?;

            this.builder.position_at_end(body_bb);
            this.compile_expr(body)?;
            let step_value = this.compile_expr(step)?;
            let current = this
                .builder
                .build_load(slot, var)?
                .into_float_value();
            let next = this.builder.build_float_add(current, step_value, "nextvar")?;
            this.builder.build_store(slot, next)?;
            this.builder.build_unconditional_branch(cond_bb)?;

            this.builder.position_at_end(after_bb);
            Ok(())
        })?;

        // Loops are statements in value clothing.
        Ok(self.context.f64_type().const_float(0.0))
    }

    /// `var`/`in`: every initializer evaluates in the enclosing scope before
    /// any binding is installed, so no initializer sees a sibling binding or
    /// the variable it initializes.
    fn compile_var_in(
        &mut self,
        bindings: &[(String, Expr)],
        body: &Expr,
    ) -> Result<FloatValue<'ctx>, CodeGenError> {
        let parent = self.current_function();

        let mut initialized = Vec::with_capacity(bindings.len());
        for (name, init) in bindings {
            initialized.push((name, self.compile_expr(init)?));
        }

        let names: Vec<String> = bindings.iter().map(|(name, _)| name.clone()).collect();
        self.with_restored_bindings(&names, |this| {
            for (name, value) in initialized {
                let slot = this.create_entry_block_alloca(parent, name)?;
                this.builder.build_store(slot, value)?;
                this.variables.insert(name.clone(), slot);
            }
            this.compile_expr(body)
        })
    }

    /// Runs `f` with the current bindings for `names` saved, and restores
    /// them however `f` exits. This is the scope discipline behind `for`
    /// and `var`/`in` shadowing: a generation failure mid-scope still puts
    /// the outer bindings back before the error propagates.
    fn with_restored_bindings<T>(
        &mut self,
        names: &[String],
        f: impl FnOnce(&mut Self) -> Result<T, CodeGenError>,
    ) -> Result<T, CodeGenError> {
        let saved: Vec<(String, Option<PointerValue<'ctx>>)> = names
            .iter()
            .map(|name| (name.clone(), self.variables.get(name).copied()))
            .collect();

        let result = f(self);

        for (name, previous) in saved {
            match previous {
                Some(slot) => {
                    self.variables.insert(name, slot);
                }
                None => {
                    self.variables.remove(&name);
                }
            }
        }

        result
    }

    fn emit_call(
        &mut self,
        function: FunctionValue<'ctx>,
        args: &[FloatValue<'ctx>],
        name: &str,
    ) -> Result<FloatValue<'ctx>, CodeGenError> {
        let args: Vec<BasicMetadataValueEnum> = args.iter().map(|&arg| arg.into()).collect();
        let call = self.builder.build_call(function, &args, name)?;
        match call.try_as_basic_value() {
            ValueKind::Basic(value) => Ok(value.into_float_value()),
            // Every function in the module returns a double.
            ValueKind::Instruction(_) => unreachable!("calls always produce a value"),
        }
    }

    /// New stack slot in the function's entry block. A separate builder is
    /// positioned before the first entry instruction so allocas never end up
    /// inside loop bodies, where they would grow the stack per iteration.
    fn create_entry_block_alloca(
        &self,
        function: FunctionValue<'ctx>,
        name: &str,
    ) -> Result<PointerValue<'ctx>, CodeGenError> {
        let builder = self.context.create_builder();
        let entry = function.get_first_basic_block().unwrap();

        match entry.get_first_instruction() {
            Some(first) => builder.position_before(&first),
            None => builder.position_at_end(entry),
        }

        Ok(builder.build_alloca(self.context.f64_type(), name)?)
    }

    fn current_function(&self) -> FunctionValue<'ctx> {
        self.builder.get_insert_block().unwrap().get_parent().unwrap()
    }
}
