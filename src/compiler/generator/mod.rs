//! # Lowering Engine
//!
//! Turns method, constructor, library and free-function bodies into IR
//! function definitions. One [`FunctionLowerer`] lowers one function (or one
//! top-level region) and owns its scopes, temporaries and the stack of blocks
//! statements are emitted into.
//!
//! ## Module Organization
//!
//! | File | Contents |
//! |------|----------|
//! | `mod.rs` | Lowerer state, scopes, temporaries, entry points |
//! | `stmt.rs` | Statements and control flow |
//! | `expr.rs` | Expressions, literals, operators, conversions |
//! | `storage_access.rs` | Places: storage slots, mappings, arrays, struct copies |
//! | `calls.rs` | Internal, library, external, low-level calls, creation, `abi.*` |
//! | `events.rs` | Events, `require`, `assert`, reverts and custom errors |
//! | `helpers.rs` | Memoized helper registry |
//!
//! ## Conventions
//!
//! - Source locals become `var_<name>`, suffixed when a name is reused, since
//!   the IR forbids shadowing.
//! - Temporaries are `_N`; captured branch conditions are `__cond_N`.
//! - Every call to a user function or helper with a result is bound to a
//!   temporary, so side effects run in source order.
//! - Return variables are `ret_0`, `ret_1`, ...

mod calls;
mod events;
mod expr;
pub mod helpers;
mod stmt;
mod storage_access;

pub use helpers::{DynamicHelper, HelperKey, HelperRegistry};

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::inheritance::constructor_name;
use super::ir::{self, call, ident, num, FunctionDef, Statement};
use super::runtime::RuntimeHelper;
use super::types::TypeDescriptor;
use super::CompilationContext;
use crate::ast::{self, ClassDecl, ConstructorDecl, FieldDecl, FunctionDecl, MethodDecl, Param};
use crate::{Error, Result};

/// A lowered expression and its type
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Value {
    pub expr: ir::Expression,
    pub ty: TypeDescriptor,
}

impl Value {
    pub fn new(expr: ir::Expression, ty: TypeDescriptor) -> Self {
        Self { expr, ty }
    }

    /// Result of a call returning nothing
    pub fn void() -> Self {
        Self {
            expr: num(0),
            ty: TypeDescriptor::Tuple(Vec::new()),
        }
    }

    pub fn is_void(&self) -> bool {
        self.ty == TypeDescriptor::Tuple(Vec::new())
    }
}

/// Assignable location
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Place {
    /// Local variable (or a temporary holding a memory pointer)
    Local { name: String, ty: TypeDescriptor },
    /// Storage location; `slot` is a literal or a temporary
    Storage {
        slot: ir::Expression,
        offset: u8,
        size: u8,
        ty: TypeDescriptor,
        transient: bool,
    },
    /// Memory word
    Memory { addr: ir::Expression, ty: TypeDescriptor },
    /// Single byte of a memory byte array
    MemoryByte { addr: ir::Expression },
}

impl Place {
    pub fn ty(&self) -> TypeDescriptor {
        match self {
            Place::Local { ty, .. } | Place::Storage { ty, .. } | Place::Memory { ty, .. } => {
                ty.clone()
            }
            Place::MemoryByte { .. } => TypeDescriptor::FixedBytes(1),
        }
    }
}

/// What the lowerer is producing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoweringMode {
    /// Deployed code: immutables are read-only
    Runtime,
    /// Constructor bodies: immutables are writable
    Constructor,
    /// Field initializers: immutables writable, single-`return` methods inlined
    Initializer,
}

/// Function lowered on demand after the class methods
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PendingFunction {
    /// Static method of a library
    Library { library: String, method: String },
    /// Free function
    Free(String),
}

impl PendingFunction {
    /// IR name of the function
    pub fn ir_name(&self) -> String {
        match self {
            PendingFunction::Library { library, method } => library_function_name(library, method),
            PendingFunction::Free(name) => free_function_name(name),
        }
    }
}

/// IR name of a library method
pub fn library_function_name(library: &str, method: &str) -> String {
    format!("fun_{}_{}", library, method)
}

/// IR name of a free function
pub fn free_function_name(name: &str) -> String {
    format!("free_fun_{}", name)
}

/// IR name of a public field getter
pub fn getter_name(field: &str) -> String {
    format!("getter_{}", field)
}

#[derive(Debug, Clone)]
struct Local {
    ir_name: String,
    ty: TypeDescriptor,
}

/// Code the lowered body belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
enum Owner {
    /// Method, constructor or initializer of the compiled class
    Contract,
    /// Static method of a library: no `this`, no storage
    Library(String),
    /// Free function: no `this`, no storage
    Free,
}

/// Capture target of the guarded statement of a `try`
#[derive(Debug, Clone)]
struct Guard {
    success: String,
    ret: String,
    captured: bool,
}

/// Lowers one function body (or one top-level region) to IR
pub struct FunctionLowerer<'c, 'a> {
    ctx: &'c mut CompilationContext<'a>,
    /// Class whose source is being lowered (resolves `super`)
    class: String,
    /// IR function name, for diagnostics
    function: String,
    mode: LoweringMode,
    owner: Owner,
    scopes: Vec<BTreeMap<String, Local>>,
    declared: BTreeSet<String>,
    counter: usize,
    blocks: Vec<Vec<Statement>>,
    returns: Vec<(String, TypeDescriptor)>,
    guard: Option<Guard>,
    inline_depth: usize,
}

impl<'c, 'a> FunctionLowerer<'c, 'a> {
    /// Lowerer emitting into an empty root block
    pub fn new(
        ctx: &'c mut CompilationContext<'a>,
        class: &str,
        function: &str,
        mode: LoweringMode,
    ) -> Self {
        Self {
            ctx,
            class: class.to_string(),
            function: function.to_string(),
            mode,
            owner: Owner::Contract,
            scopes: vec![BTreeMap::new()],
            declared: BTreeSet::new(),
            counter: 0,
            blocks: vec![Vec::new()],
            returns: Vec::new(),
            guard: None,
            inline_depth: 0,
        }
    }

    // =========================================================================
    // ENTRY POINTS
    // =========================================================================

    /// Lower a class method under `ir_name`
    pub fn lower_method(
        ctx: &'c mut CompilationContext<'a>,
        owner: &ClassDecl,
        method: &MethodDecl,
        ir_name: &str,
    ) -> Result<FunctionDef> {
        let body = method.body.as_deref().ok_or_else(|| {
            Error::compiler(format!("method `{}` of {} has no body", method.name, owner.name))
        })?;
        let mut lowerer = Self::new(ctx, &owner.name, ir_name, LoweringMode::Runtime);
        lowerer.function_def(&method.params, &method.returns, body)
    }

    /// Lower a class constructor into `constructor_<Class>`
    pub fn lower_constructor(
        ctx: &'c mut CompilationContext<'a>,
        owner: &ClassDecl,
        ctor: &ConstructorDecl,
    ) -> Result<FunctionDef> {
        let name = constructor_name(&owner.name);
        let parent = ctx.chain.parent_constructor(&owner.name);
        let mut lowerer = Self::new(ctx, &owner.name, &name, LoweringMode::Constructor);

        let mut body = Vec::with_capacity(ctor.body.len() + 1);
        if !stmt::calls_super_constructor(&ctor.body) {
            if let Some((parent, parent_ctor)) = parent {
                if !parent_ctor.params.is_empty() {
                    return Err(Error::ArityMismatch {
                        callee: constructor_name(&parent.name),
                        expected: parent_ctor.params.len(),
                        got: 0,
                    });
                }
                body.push(ast::Statement::expr(ast::Expression::Super.call(Vec::new())));
            }
        }
        body.extend(ctor.body.iter().cloned());
        lowerer.function_def(&ctor.params, &[], &body)
    }

    /// Lower a library method into `fun_<Library>_<method>`
    pub fn lower_library_method(
        ctx: &'c mut CompilationContext<'a>,
        library: &str,
        method: &MethodDecl,
    ) -> Result<FunctionDef> {
        let name = library_function_name(library, &method.name);
        let body = method
            .body
            .as_deref()
            .ok_or_else(|| Error::compiler(format!("library method `{}` has no body", name)))?;
        let mut lowerer = Self::new(ctx, library, &name, LoweringMode::Runtime);
        lowerer.owner = Owner::Library(library.to_string());
        lowerer.function_def(&method.params, &method.returns, body)
    }

    /// Lower a free function into `free_fun_<name>`
    pub fn lower_free_function(
        ctx: &'c mut CompilationContext<'a>,
        function: &FunctionDecl,
    ) -> Result<FunctionDef> {
        let name = free_function_name(&function.name);
        let class = ctx.chain.most_derived().name.clone();
        let mut lowerer = Self::new(ctx, &class, &name, LoweringMode::Runtime);
        lowerer.owner = Owner::Free;
        lowerer.function_def(&function.params, &function.returns, &function.body)
    }

    /// Lower every field initializer of the chain, base first, as
    /// constructor-region statements
    pub fn lower_initializers(
        ctx: &'c mut CompilationContext<'a>,
        region: &str,
    ) -> Result<Vec<Statement>> {
        let classes = ctx.chain.classes().to_vec();
        let mut lowerer = Self::new(ctx, region, region, LoweringMode::Initializer);
        for class in classes {
            lowerer.class = class.name.clone();
            for field in &class.fields {
                if field.storage == ast::StorageClass::Constant {
                    continue;
                }
                if let Some(init) = &field.initializer {
                    lowerer.lower_field_initializer(field, init)?;
                }
            }
        }
        Ok(lowerer.finish())
    }

    /// Lower the getter of a public field
    pub fn lower_getter(
        ctx: &'c mut CompilationContext<'a>,
        owner: &ClassDecl,
        field: &FieldDecl,
    ) -> Result<FunctionDef> {
        let name = getter_name(&field.name);
        let ty = ctx.catalog.resolve_type(&field.ty)?;
        let (params, ret) = super::catalog::getter_shape(&ty);
        let mut lowerer = Self::new(ctx, &owner.name, &name, LoweringMode::Runtime);

        let keys: Vec<String> = (0..params.len()).map(|i| format!("key_{}", i)).collect();
        lowerer.returns = vec![("ret_0".to_string(), ret.clone())];
        let value = if field.storage == ast::StorageClass::Constant {
            let init = field.initializer.as_ref().ok_or_else(|| {
                Error::compiler(format!("constant `{}` has no value", field.name))
            })?;
            lowerer.lower_expr_as(init, &ret)?
        } else {
            let mut place = lowerer.field_place(&field.name, false)?;
            for (key, key_ty) in keys.iter().zip(params) {
                let index = Value::new(ident(key), key_ty);
                place = lowerer.index_place(place, index, &field.name)?;
            }
            lowerer.load(&place)?
        };
        lowerer.emit(Statement::assign("ret_0", value.expr));

        Ok(FunctionDef {
            name,
            params: keys,
            returns: vec!["ret_0".to_string()],
            body: lowerer.finish(),
        })
    }

    fn lower_field_initializer(&mut self, field: &FieldDecl, init: &ast::Expression) -> Result<()> {
        let place = self.field_place(&field.name, true)?;
        let value = self.lower_expr_as(init, &place.ty())?;
        self.store(&place, value)
    }

    fn function_def(
        &mut self,
        params: &[Param],
        returns: &[String],
        body: &[ast::Statement],
    ) -> Result<FunctionDef> {
        let mut param_names = Vec::with_capacity(params.len());
        for p in params {
            let ty = self.resolve(&p.ty)?;
            param_names.push(self.declare(&p.name, ty));
        }
        for (i, r) in returns.iter().enumerate() {
            let ty = self.resolve(r)?;
            let name = format!("ret_{}", i);
            self.declared.insert(name.clone());
            self.returns.push((name, ty));
        }
        for s in body {
            self.lower_statement(s)?;
        }
        debug!(function = %self.function, temps = self.counter, "Function lowered");
        Ok(FunctionDef {
            name: self.function.clone(),
            params: param_names,
            returns: self.returns.iter().map(|(n, _)| n.clone()).collect(),
            body: self.finish(),
        })
    }

    /// Statements of the root block
    pub fn finish(&mut self) -> Vec<Statement> {
        self.blocks.drain(..).next().unwrap_or_default()
    }

    // =========================================================================
    // SCOPES AND TEMPORARIES
    // =========================================================================

    /// Declare a source local in the innermost scope; returns its IR name
    fn declare(&mut self, name: &str, ty: TypeDescriptor) -> String {
        let base = format!("var_{}", name);
        let mut ir_name = base.clone();
        let mut n = 1;
        while self.declared.contains(&ir_name) {
            ir_name = format!("{}_{}", base, n);
            n += 1;
        }
        self.declared.insert(ir_name.clone());
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                name.to_string(),
                Local {
                    ir_name: ir_name.clone(),
                    ty,
                },
            );
        }
        ir_name
    }

    /// Bind a source name to an existing IR variable (inlined parameters)
    fn alias(&mut self, name: &str, ir_name: &str, ty: TypeDescriptor) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                name.to_string(),
                Local {
                    ir_name: ir_name.to_string(),
                    ty,
                },
            );
        }
    }

    fn lookup(&self, name: &str) -> Option<&Local> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    fn temp(&mut self) -> String {
        self.counter += 1;
        format!("_{}", self.counter)
    }

    fn cond_temp(&mut self) -> String {
        self.counter += 1;
        format!("__cond_{}", self.counter)
    }

    fn emit(&mut self, stmt: Statement) {
        if let Some(block) = self.blocks.last_mut() {
            block.push(stmt);
        }
    }

    fn emit_expr(&mut self, e: ir::Expression) {
        self.emit(Statement::expr(e));
    }

    /// Lower statements into a fresh block and scope
    fn lower_block(&mut self, stmts: &[ast::Statement]) -> Result<Vec<Statement>> {
        self.with_block(|this| {
            for s in stmts {
                this.lower_statement(s)?;
            }
            Ok(())
        })
        .map(|(stmts, _)| stmts)
    }

    /// Run `f` with a fresh block and scope; returns the emitted statements
    fn with_block<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<(Vec<Statement>, T)> {
        self.blocks.push(Vec::new());
        self.scopes.push(BTreeMap::new());
        let result = f(self);
        self.scopes.pop();
        let block = self.blocks.pop().unwrap_or_default();
        result.map(|value| (block, value))
    }

    /// Bind a value to a temporary unless it is a literal or identifier
    fn capture(&mut self, value: Value) -> Value {
        match value.expr {
            ir::Expression::Literal(_) | ir::Expression::Identifier(_) => value,
            expr => {
                let t = self.temp();
                self.emit(Statement::let_(t.clone(), expr));
                Value::new(ident(&t), value.ty)
            }
        }
    }

    /// Bind a value to a fresh temporary, always
    fn capture_fresh(&mut self, value: Value) -> Value {
        let t = self.temp();
        self.emit(Statement::let_(t.clone(), value.expr));
        Value::new(ident(&t), value.ty)
    }

    fn resolve(&self, text: &str) -> Result<TypeDescriptor> {
        self.ctx.catalog.resolve_type(text)
    }

    /// Ensure a runtime helper and return its name
    fn rt(&mut self, helper: RuntimeHelper) -> String {
        self.ctx.helpers.runtime(helper)
    }

    /// Call a runtime helper
    fn call_rt(&mut self, helper: RuntimeHelper, args: Vec<ir::Expression>) -> ir::Expression {
        let name = self.rt(helper);
        call(&name, args)
    }

    fn undefined(&self, name: &str) -> Error {
        Error::UndefinedIdentifier {
            name: name.to_string(),
            function: self.function.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expression, FieldDecl, SourceUnit, Statement as S};
    use crate::compiler::{CompilationContext, CompileOptions};

    fn unit() -> SourceUnit {
        SourceUnit::new("t.ts").with_class(
            ClassDecl::new("Counter")
                .field(FieldDecl::new("count", "u256"))
                .method(
                    MethodDecl::new("bump")
                        .param("by", "u256")
                        .body(vec![S::let_("by", Expression::ident("by")), S::expr(
                            Expression::compound(
                                ast::AssignOp::Add,
                                Expression::this_field("count"),
                                Expression::ident("by"),
                            ),
                        )]),
                ),
        )
    }

    #[test]
    fn test_redeclared_local_gets_suffix() {
        let unit = unit();
        let mut ctx = CompilationContext::build(&unit, &[], "Counter", CompileOptions::default())
            .unwrap();
        let (owner, method) = ctx.chain.find_method("bump").unwrap();
        let def = FunctionLowerer::lower_method(&mut ctx, owner, method, "fun_bump").unwrap();
        assert_eq!(def.params, vec!["var_by"]);
        assert!(matches!(
            &def.body[0],
            Statement::Let { names, .. } if names == &vec!["var_by_1".to_string()]
        ));
    }
}
