//! # tsyul Compiler - contract classes to Yul IR
//!
//! This module compiles a class of a parsed [`SourceUnit`] into a Yul-style
//! IR module with a constructor region and a deployed region, ready for a
//! downstream assembler.
//!
//! ## Architecture
//!
//! ```text
//! SourceUnit → Catalog → Inheritance chain → Storage layout
//!            → Lowering (methods, getters, libraries, helpers)
//!            → Dispatcher → IrModule + ABI + slot map
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use tsyul::compiler::{Compiler, CompileOptions};
//!
//! let compiler = Compiler::new(CompileOptions::default());
//! let result = compiler.compile(&unit, &[], "Token")?;
//! println!("{}", result.module);
//! ```

pub mod abi;
pub mod catalog;
pub mod debug;
pub mod dispatcher;
pub mod generator;
pub mod inheritance;
pub mod ir;
pub mod runtime;
pub mod storage;
pub mod types;

pub use abi::{AbiEntry, CustomErrorMeta, EventMeta, FunctionMeta, ParamMeta};
pub use catalog::Catalog;
pub use debug::{dump_ir, fingerprint};
pub use generator::{FunctionLowerer, HelperRegistry, PendingFunction};
pub use inheritance::InheritanceChain;
pub use ir::{IrModule, Statement};
pub use storage::{SlotKind, StorageLayout, StorageSlot};
pub use types::TypeDescriptor;

use std::collections::{BTreeSet, VecDeque};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ast::{ClassDecl, MethodDecl, MethodKind, Mutability, SourceUnit};
use crate::{Error, Result};
use abi::AbiKind;
use dispatcher::{decode_constructor_args, DispatcherBuilder, SpecialEntry};
use generator::getter_name;
use inheritance::{constructor_name, function_name};
use ir::{call, num, FunctionDef};

/// Target VM revision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvmVersion {
    /// No transient storage, no `mcopy`
    Shanghai,
    /// Transient storage and `mcopy`
    #[default]
    Cancun,
}

impl EvmVersion {
    /// True when `tload`/`tstore` are available
    pub fn supports_transient(&self) -> bool {
        matches!(self, EvmVersion::Cancun)
    }
}

/// What happens to revert messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevertStrings {
    /// Encode messages as `Error(string)`
    #[default]
    Keep,
    /// Lower message reverts to empty reverts
    Strip,
}

/// Compilation options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Target VM revision
    pub evm_version: EvmVersion,
    /// Revert message handling
    pub revert_strings: RevertStrings,
    /// Synthesize getters for public fields
    pub public_getters: bool,
    /// Emit source-level comments in the IR
    pub debug_comments: bool,
    /// Produce the ABI description
    pub emit_abi: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            evm_version: EvmVersion::Cancun,
            revert_strings: RevertStrings::Keep,
            public_getters: true,
            debug_comments: false,
            emit_abi: true,
        }
    }
}

impl CompileOptions {
    /// Parse options from JSON; missing keys keep their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InvalidOptions(e.to_string()))
    }
}

/// Mutable state of one class compilation
pub struct CompilationContext<'a> {
    /// Declarations visible to the class
    pub catalog: Catalog<'a>,
    /// Linearized ancestry, base first
    pub chain: InheritanceChain<'a>,
    /// Field slot map
    pub layout: StorageLayout,
    /// Options in effect
    pub options: CompileOptions,
    /// Helpers synthesized so far
    pub helpers: HelperRegistry,
    /// Objects created with `new`
    pub dependencies: BTreeSet<String>,
    pending: VecDeque<PendingFunction>,
    requested: BTreeSet<PendingFunction>,
    warnings: Vec<String>,
}

impl<'a> CompilationContext<'a> {
    /// Index declarations, linearize `class` and allocate its storage
    pub fn build(
        unit: &'a SourceUnit,
        deps: &'a [SourceUnit],
        class: &str,
        options: CompileOptions,
    ) -> Result<Self> {
        let catalog = Catalog::build(unit, deps)?;
        let decl = catalog
            .class(class)
            .ok_or_else(|| Error::ClassNotFound(class.to_string()))?;
        let chain = InheritanceChain::linearize(decl, &catalog)?;
        let layout =
            StorageLayout::allocate(&chain, &catalog, options.evm_version.supports_transient())?;
        debug!(class = %class, chain = chain.classes().len(), slots = layout.len(), "Context built");
        Ok(Self {
            catalog,
            chain,
            layout,
            helpers: HelperRegistry::new(options.evm_version),
            options,
            dependencies: BTreeSet::new(),
            pending: VecDeque::new(),
            requested: BTreeSet::new(),
            warnings: Vec::new(),
        })
    }

    /// Queue a library or free function for lowering, once
    pub fn request(&mut self, function: PendingFunction) {
        if self.requested.insert(function.clone()) {
            self.pending.push_back(function);
        }
    }

    /// Next function waiting to be lowered
    pub fn next_pending(&mut self) -> Option<PendingFunction> {
        self.pending.pop_front()
    }

    /// Record a tolerated oddity
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }

    /// Warnings recorded so far
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Compilation result with metadata
#[derive(Debug, Clone)]
pub struct CompileResult {
    /// Constructor and deployed regions
    pub module: IrModule,
    /// Externally reachable functions, getters included
    pub functions: Vec<FunctionMeta>,
    /// Events declared along the chain
    pub events: Vec<EventMeta>,
    /// Custom errors visible to the class
    pub errors: Vec<CustomErrorMeta>,
    /// Standard ABI description (JSON), when enabled
    pub abi: Option<String>,
    /// Field slot map
    pub layout: StorageLayout,
    /// SHA-256 of the printed module
    pub fingerprint: String,
    /// Warnings generated during compilation
    pub warnings: Vec<String>,
}

impl CompileResult {
    /// Function metadata by source name
    pub fn function(&self, name: &str) -> Option<&FunctionMeta> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Contract class to IR compiler
pub struct Compiler {
    options: CompileOptions,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

impl Compiler {
    /// Create a new compiler with options
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Options in effect
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Names of the classes of `unit` that can be deployed
    pub fn deployable_classes(unit: &SourceUnit) -> Vec<&str> {
        unit.classes
            .iter()
            .filter(|c| !c.is_library() && !c.is_abstract)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Compile several classes in parallel, each with its own context
    pub fn compile_all(
        &self,
        unit: &SourceUnit,
        deps: &[SourceUnit],
        classes: &[&str],
    ) -> Vec<(String, Result<CompileResult>)> {
        classes
            .par_iter()
            .map(|class| (class.to_string(), self.compile(unit, deps, class)))
            .collect()
    }

    /// Compile one class of `unit`
    pub fn compile(&self, unit: &SourceUnit, deps: &[SourceUnit], class: &str) -> Result<CompileResult> {
        let mut ctx = CompilationContext::build(unit, deps, class, self.options.clone())?;
        let decl = ctx.chain.most_derived();
        if decl.is_library() {
            return Err(Error::unsupported(format!("library `{}` is not deployable", class)));
        }
        if decl.is_abstract {
            return Err(Error::unsupported(format!("abstract class `{}` is not deployable", class)));
        }

        // Phase 1: methods, renamed parents and getters
        let mut functions = Vec::new();
        let mut defs = Vec::new();
        let mut receive = None;
        let mut fallback = None;
        for (owner, method) in ctx.chain.final_methods() {
            let ir_name = function_name(&method.name);
            defs.push(FunctionLowerer::lower_method(&mut ctx, owner, method, &ir_name)?);
            match method.kind {
                MethodKind::Receive => {
                    receive = Some(SpecialEntry {
                        ir_name,
                        payable: true,
                    })
                }
                MethodKind::Fallback => {
                    fallback = Some(SpecialEntry {
                        ir_name,
                        payable: method.mutability == Mutability::Payable,
                    })
                }
                MethodKind::Normal if method.visibility.is_external() && !method.is_static => {
                    functions.push(function_meta(&ctx.catalog, method, &ir_name)?);
                }
                MethodKind::Normal => {}
            }
        }
        for (owner, method, ir_name) in ctx.chain.renamed_methods() {
            defs.push(FunctionLowerer::lower_method(&mut ctx, owner, method, &ir_name)?);
        }
        if ctx.options.public_getters {
            self.lower_getters(&mut ctx, &mut functions, &mut defs)?;
        }

        // Phase 2: constructor region
        let (constructor_code, ctor_defs, ctor_params, payable) = lower_constructor_region(&mut ctx)?;

        // Phase 3: library and free functions reached from any body
        while let Some(pending) = ctx.next_pending() {
            let def = match &pending {
                PendingFunction::Library { library, method } => {
                    let decl = ctx.catalog.library_method(library, method)?;
                    FunctionLowerer::lower_library_method(&mut ctx, library, decl)?
                }
                PendingFunction::Free(name) => {
                    let decl = ctx
                        .catalog
                        .free_function(name)
                        .ok_or_else(|| Error::unresolved("function", name.clone()))?;
                    FunctionLowerer::lower_free_function(&mut ctx, decl)?
                }
            };
            defs.push(def);
        }

        // Phase 4: dispatcher and module assembly
        let dispatcher = DispatcherBuilder::new(&mut ctx.helpers).build(
            &functions,
            receive.as_ref(),
            fallback.as_ref(),
        )?;
        let helpers = ctx.helpers.definitions();

        let mut module = IrModule::new(class);
        module.constructor_code = constructor_code;
        module
            .constructor_code
            .extend(ctor_defs.into_iter().map(ir::Statement::FunctionDef));
        module
            .constructor_code
            .extend(defs.iter().cloned().map(ir::Statement::FunctionDef));
        module
            .constructor_code
            .extend(helpers.iter().cloned().map(ir::Statement::FunctionDef));

        module.deployed.code.push(init_free_pointer());
        module.deployed.code.extend(dispatcher);
        module
            .deployed
            .code
            .extend(defs.into_iter().map(ir::Statement::FunctionDef));
        module
            .deployed
            .code
            .extend(helpers.into_iter().map(ir::Statement::FunctionDef));
        module.dependencies = ctx.dependencies.iter().cloned().collect();

        // Phase 5: metadata
        let mut events = Vec::new();
        for c in ctx.chain.classes() {
            for e in &c.events {
                events.push(ctx.catalog.event_meta(e)?);
            }
        }
        let errors: Vec<CustomErrorMeta> = ctx.catalog.custom_errors().cloned().collect();
        let abi = if ctx.options.emit_abi {
            let mut entries = Vec::new();
            for f in &functions {
                entries.push(AbiEntry::function(f, &ctx.catalog)?);
            }
            if ctx.chain.effective_constructor().is_some() {
                entries.push(AbiEntry::constructor(&ctor_params, payable, &ctx.catalog)?);
            }
            for e in &events {
                entries.push(AbiEntry::event(e, &ctx.catalog)?);
            }
            for e in &errors {
                entries.push(AbiEntry::error(e, &ctx.catalog)?);
            }
            if let Some(f) = &fallback {
                entries.push(AbiEntry::special(AbiKind::Fallback, f.payable));
            }
            if receive.is_some() {
                entries.push(AbiEntry::special(AbiKind::Receive, true));
            }
            Some(abi::abi_json(&entries)?)
        } else {
            None
        };

        let fingerprint = debug::fingerprint(&module);
        debug!(
            class = %class,
            functions = functions.len(),
            helpers = ctx.helpers.len(),
            statements = module.statement_count(),
            "Module assembled"
        );
        Ok(CompileResult {
            module,
            functions,
            events,
            errors,
            abi,
            layout: ctx.layout.clone(),
            fingerprint,
            warnings: ctx.warnings().to_vec(),
        })
    }

    /// Getters for public fields not shadowed by a method of the same name
    fn lower_getters(
        &self,
        ctx: &mut CompilationContext<'_>,
        functions: &mut Vec<FunctionMeta>,
        defs: &mut Vec<FunctionDef>,
    ) -> Result<()> {
        for owner in ctx.chain.classes().to_vec() {
            for field in owner.fields.iter().filter(|f| f.visibility.is_external()) {
                if ctx.chain.find_method(&field.name).is_some() {
                    continue;
                }
                let ty = ctx.catalog.resolve_type(&field.ty)?;
                let (keys, ret) = catalog::getter_shape(&ty);
                let readable = |t: &TypeDescriptor| t.is_value_type() || t.is_bytes_like();
                if !readable(&ret) || !keys.iter().all(readable) {
                    ctx.warn(format!(
                        "no getter for public field `{}` of type {}",
                        field.name,
                        ty.describe()
                    ));
                    continue;
                }
                let name = getter_name(&field.name);
                defs.push(FunctionLowerer::lower_getter(ctx, owner, field)?);
                let params = keys
                    .into_iter()
                    .enumerate()
                    .map(|(i, ty)| ParamMeta {
                        name: format!("key_{}", i),
                        type_text: ty.describe(),
                        is_dynamic_array: false,
                        ty,
                    })
                    .collect();
                functions.push(FunctionMeta::new(
                    &field.name,
                    &name,
                    params,
                    vec![ret],
                    Mutability::View,
                    &ctx.catalog,
                )?);
            }
        }
        Ok(())
    }
}

/// `mstore(64, 128)`: free memory starts after the reserved words
fn init_free_pointer() -> ir::Statement {
    ir::Statement::expr(call("mstore", vec![num(64), num(128)]))
}

fn function_meta(catalog: &Catalog<'_>, method: &MethodDecl, ir_name: &str) -> Result<FunctionMeta> {
    let params = method
        .params
        .iter()
        .map(|p| ParamMeta::resolve(&p.name, &p.ty, catalog))
        .collect::<Result<Vec<_>>>()?;
    let returns = method
        .returns
        .iter()
        .map(|r| catalog.resolve_type(r))
        .collect::<Result<Vec<_>>>()?;
    FunctionMeta::new(&method.name, ir_name, params, returns, method.mutability, catalog)
}

type ConstructorRegion = (Vec<ir::Statement>, Vec<FunctionDef>, Vec<ParamMeta>, bool);

/// Value check, argument decoding, initializers, constructor call and code copy
fn lower_constructor_region(ctx: &mut CompilationContext<'_>) -> Result<ConstructorRegion> {
    let class = ctx.chain.most_derived().name.clone();
    let effective = ctx.chain.effective_constructor();
    let payable = effective.map_or(false, |(_, c)| c.payable);
    let params = match effective {
        Some((_, ctor)) => ctor
            .params
            .iter()
            .map(|p| ParamMeta::resolve(&p.name, &p.ty, &ctx.catalog))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let mut code = vec![init_free_pointer()];
    if !payable {
        code.push(ir::Statement::if_(
            call("callvalue", vec![]),
            vec![ir::Statement::expr(call("revert", vec![num(0), num(0)]))],
        ));
    }
    let (decode, args) = decode_constructor_args(&class, &params, &mut ctx.helpers)?;
    code.extend(decode);
    code.extend(FunctionLowerer::lower_initializers(ctx, &class)?);

    let mut defs = Vec::new();
    let classes: Vec<&ClassDecl> = ctx.chain.classes().to_vec();
    for c in classes {
        if let Some(ctor) = &c.constructor {
            defs.push(FunctionLowerer::lower_constructor(ctx, c, ctor)?);
        }
    }
    if let Some((owner, _)) = effective {
        code.push(ir::Statement::expr(call(&constructor_name(&owner.name), args)));
    }

    let deployed = ir::deployed_name(&class);
    let size = call("datasize", vec![ir::Expression::str_lit(deployed.clone())]);
    code.push(ir::Statement::expr(call(
        "codecopy",
        vec![
            num(0),
            call("dataoffset", vec![ir::Expression::str_lit(deployed)]),
            size.clone(),
        ],
    )));
    code.push(ir::Statement::expr(call("return", vec![num(0), size])));
    Ok((code, defs, params, payable))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expression, FieldDecl, Statement as S};

    fn counter() -> SourceUnit {
        SourceUnit::new("counter.ts").with_class(
            ClassDecl::new("Counter")
                .field(FieldDecl::new("count", "u256").public())
                .method(MethodDecl::new("increment").body(vec![S::expr(Expression::post_inc(
                    Expression::this_field("count"),
                ))])),
        )
    }

    #[test]
    fn test_options_from_json_keeps_defaults() {
        let options = CompileOptions::from_json(r#"{"evm_version":"shanghai"}"#).unwrap();
        assert_eq!(options.evm_version, EvmVersion::Shanghai);
        assert!(options.public_getters);
        assert!(!options.evm_version.supports_transient());

        let err = CompileOptions::from_json(r#"{"revert_strings":"drop"}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidOptions(_)));
    }

    #[test]
    fn test_getter_is_dispatched() {
        let unit = counter();
        let result = Compiler::default().compile(&unit, &[], "Counter").unwrap();
        let names: Vec<&str> = result.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["increment", "count"]);
        assert!(result.module.deployed_functions().contains(&"getter_count"));
    }

    #[test]
    fn test_unknown_class() {
        let unit = counter();
        let err = Compiler::default().compile(&unit, &[], "Missing").unwrap_err();
        assert_eq!(err, Error::ClassNotFound("Missing".into()));
    }

    #[test]
    fn test_requests_are_deduplicated() {
        let unit = counter();
        let mut ctx = CompilationContext::build(&unit, &[], "Counter", CompileOptions::default())
            .unwrap();
        ctx.request(PendingFunction::Free("f".into()));
        ctx.request(PendingFunction::Free("f".into()));
        assert_eq!(ctx.next_pending(), Some(PendingFunction::Free("f".into())));
        assert_eq!(ctx.next_pending(), None);
    }
}
