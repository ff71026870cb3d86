//! Dispatcher Builder
//!
//! Generates the selector switch at the top of the deployed region and the
//! argument decoding of the constructor region.
//!
//! Calldata layout of a call:
//!
//! ```text
//! [selector: 4 bytes][head words ...][tail: dynamic values]
//! ```
//!
//! Value parameters are single head words. `bytes`, `string` and dynamic
//! value arrays hold an offset in the head (relative to the start of the
//! arguments) and are copied to memory as `[length][data]`. Fixed value arrays
//! are inlined in the head and copied to memory as `[words]`.

use tracing::debug;

use super::abi::{selector_hex, FunctionMeta, ParamMeta};
use super::generator::helpers::{abi_shape, shape_literal};
use super::generator::{DynamicHelper, HelperRegistry};
use super::ir::{call, ident, num, Expression, Statement, SwitchCase, Literal};
use super::runtime::RuntimeHelper;
use super::types::TypeDescriptor;
use crate::{Error, Result};

/// Start of the argument area in calldata
const ARGS_OFFSET: u128 = 4;

/// How a parameter is read from the argument area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamEncoding {
    /// One head word
    Word,
    /// Head offset to `[length][items]`; `unit` bytes per item
    Dynamic { unit: u128 },
    /// `count` words inlined in the head
    Inline { count: u64 },
}

impl ParamEncoding {
    fn of(ty: &TypeDescriptor) -> Result<Self> {
        match ty {
            t if t.is_value_type() => Ok(ParamEncoding::Word),
            TypeDescriptor::DynamicBytes | TypeDescriptor::String => {
                Ok(ParamEncoding::Dynamic { unit: 1 })
            }
            TypeDescriptor::Array(elem, None) if elem.is_value_type() => {
                Ok(ParamEncoding::Dynamic { unit: 32 })
            }
            TypeDescriptor::Array(elem, Some(n)) if elem.is_value_type() => {
                Ok(ParamEncoding::Inline { count: *n })
            }
            other => Err(Error::unsupported(format!(
                "`{}` as an external parameter",
                other.describe()
            ))),
        }
    }

    fn head_size(&self) -> u128 {
        match self {
            ParamEncoding::Inline { count } => 32 * u128::from(*count),
            _ => 32,
        }
    }
}

/// Entry invoked outside the selector switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialEntry {
    /// IR function to call
    pub ir_name: String,
    /// Accepts value
    pub payable: bool,
}

/// Builds the selector switch of the deployed region
pub struct DispatcherBuilder<'r> {
    helpers: &'r mut HelperRegistry,
    statements: Vec<Statement>,
    counter: usize,
}

impl<'r> DispatcherBuilder<'r> {
    /// Builder that registers the helpers it uses in `helpers`
    pub fn new(helpers: &'r mut HelperRegistry) -> Self {
        Self {
            helpers,
            statements: Vec::new(),
            counter: 0,
        }
    }

    fn temp(&mut self, stem: &str) -> String {
        let name = format!("{}_{}", stem, self.counter);
        self.counter += 1;
        name
    }

    fn emit(&mut self, stmt: Statement) {
        self.statements.push(stmt);
    }

    /// Selector switch followed by receive/fallback routing
    pub fn build(
        mut self,
        functions: &[FunctionMeta],
        receive: Option<&SpecialEntry>,
        fallback: Option<&SpecialEntry>,
    ) -> Result<Vec<Statement>> {
        let mut seen = std::collections::BTreeMap::new();
        for f in functions {
            if let Some(previous) = seen.insert(f.selector, &f.signature) {
                return Err(Error::compiler(format!(
                    "selector {} shared by `{}` and `{}`",
                    selector_hex(&f.selector),
                    previous,
                    f.signature
                )));
            }
        }

        let mut sorted: Vec<&FunctionMeta> = functions.iter().collect();
        sorted.sort_by_key(|f| f.selector);
        let mut cases = Vec::with_capacity(sorted.len());
        for f in sorted {
            let body = self.case_body(f)?;
            cases.push(SwitchCase {
                value: Literal::Number(selector_hex(&f.selector)),
                body,
            });
        }

        if !cases.is_empty() {
            let dispatch = vec![Statement::Switch {
                expr: call("shr", vec![num(224), call("calldataload", vec![num(0)])]),
                cases,
                default: None,
            }];
            self.emit(Statement::if_(
                call("iszero", vec![call("lt", vec![call("calldatasize", vec![]), num(4)])]),
                dispatch,
            ));
        }

        if let Some(receive) = receive {
            let body = special_body(receive);
            self.emit(Statement::if_(
                call("iszero", vec![call("calldatasize", vec![])]),
                body,
            ));
        }
        match fallback {
            Some(fallback) => self.statements.extend(special_body(fallback)),
            None => self.emit(Statement::expr(call("revert", vec![num(0), num(0)]))),
        }

        debug!(
            functions = functions.len(),
            receive = receive.is_some(),
            fallback = fallback.is_some(),
            "Dispatcher built"
        );
        Ok(self.statements)
    }

    /// Payability check, decoding, call and return of one selector case
    fn case_body(&mut self, f: &FunctionMeta) -> Result<Vec<Statement>> {
        let mut body = Vec::new();
        if !f.is_payable {
            body.push(callvalue_check());
        }

        let mut args = Vec::with_capacity(f.params.len());
        let mut head = ARGS_OFFSET;
        for p in &f.params {
            let encoding = ParamEncoding::of(&p.ty)?;
            let name = self.temp("param");
            let value = self.decode_calldata(encoding, num(head));
            body.push(Statement::let_(name.clone(), value));
            args.push(ident(&name));
            head += encoding.head_size();
        }

        let results: Vec<String> = (0..f.return_arity).map(|_| self.temp("ret")).collect();
        let invocation = call(&f.ir_name, args);
        if results.is_empty() {
            body.push(Statement::expr(invocation));
            body.push(Statement::expr(call("return", vec![num(0), num(0)])));
            return Ok(body);
        }
        body.push(Statement::Let {
            names: results.clone(),
            value: Some(invocation),
        });
        body.extend(self.encode_returns(&f.returns, &results)?);
        Ok(body)
    }

    fn decode_calldata(&mut self, encoding: ParamEncoding, head: Expression) -> Expression {
        match encoding {
            ParamEncoding::Word => call("calldataload", vec![head]),
            ParamEncoding::Dynamic { unit } => {
                let helper = self.helpers.runtime(RuntimeHelper::AbiDecodeCalldataDynamic);
                call(&helper, vec![head, num(unit)])
            }
            ParamEncoding::Inline { count } => {
                let helper = self.helpers.runtime(RuntimeHelper::AbiDecodeCalldataWords);
                call(&helper, vec![head, num(u128::from(count))])
            }
        }
    }

    /// Word-by-word return, or standard encoding when any result is dynamic
    fn encode_returns(&mut self, types: &[TypeDescriptor], results: &[String]) -> Result<Vec<Statement>> {
        let mut out = Vec::new();
        let pos = self.temp("memPos");
        out.push(Statement::let_(pos.clone(), call("mload", vec![num(64)])));

        if types.iter().all(TypeDescriptor::is_value_type) {
            for (i, r) in results.iter().enumerate() {
                let addr = offset(&pos, 32 * i as u128);
                out.push(Statement::expr(call("mstore", vec![addr, ident(r)])));
            }
            let size = 32 * results.len() as u128;
            out.push(Statement::expr(call("return", vec![ident(&pos), num(size)])));
            return Ok(out);
        }

        let shapes = types.iter().map(abi_shape).collect::<Result<Vec<_>>>()?;
        let helper = self.helpers.dynamic(DynamicHelper::AbiEncode, results.len());
        let mut args = vec![ident(&pos), shape_literal(&shapes, 2)?];
        args.extend(results.iter().map(|r| ident(r)));
        let end = self.temp("memEnd");
        out.push(Statement::let_(end.clone(), call(&helper, args)));
        out.push(Statement::expr(call(
            "return",
            vec![ident(&pos), call("sub", vec![ident(&end), ident(&pos)])],
        )));
        Ok(out)
    }
}

fn offset(base: &str, by: u128) -> Expression {
    if by == 0 {
        ident(base)
    } else {
        call("add", vec![ident(base), num(by)])
    }
}

fn callvalue_check() -> Statement {
    Statement::if_(
        call("callvalue", vec![]),
        vec![Statement::expr(call("revert", vec![num(0), num(0)]))],
    )
}

fn special_body(entry: &SpecialEntry) -> Vec<Statement> {
    let mut body = Vec::new();
    if !entry.payable {
        body.push(callvalue_check());
    }
    body.push(Statement::expr(call(&entry.ir_name, vec![])));
    body.push(Statement::expr(call("stop", vec![])));
    body
}

/// Copy the constructor arguments appended to the creation code into memory
/// and bind one variable per parameter
///
/// Dynamic values are used in place: the copied blob already stores them as
/// `[length][data]` at `base + offset`.
pub fn decode_constructor_args(
    object: &str,
    params: &[ParamMeta],
    helpers: &mut HelperRegistry,
) -> Result<(Vec<Statement>, Vec<Expression>)> {
    let mut out = Vec::new();
    let mut args = Vec::with_capacity(params.len());
    if params.is_empty() {
        return Ok((out, args));
    }

    let program_size = call("datasize", vec![Expression::str_lit(object)]);
    out.push(Statement::let_(
        "argSize",
        call("sub", vec![call("codesize", vec![]), program_size.clone()]),
    ));
    let allocate = helpers.runtime(RuntimeHelper::AllocateMemory);
    out.push(Statement::let_("argBase", call(&allocate, vec![ident("argSize")])));
    out.push(Statement::expr(call(
        "codecopy",
        vec![ident("argBase"), program_size, ident("argSize")],
    )));

    let mut head = 0u128;
    for (i, p) in params.iter().enumerate() {
        let encoding = ParamEncoding::of(&p.ty)?;
        let at = offset("argBase", head);
        let name = format!("ctorArg_{}", i);
        match encoding {
            ParamEncoding::Word => out.push(Statement::let_(name.clone(), call("mload", vec![at]))),
            ParamEncoding::Dynamic { .. } => out.push(Statement::let_(
                name.clone(),
                call("add", vec![ident("argBase"), call("mload", vec![at])]),
            )),
            ParamEncoding::Inline { count } => {
                // Fixed arrays live in memory as [length][words]
                let size = 32 * u128::from(count);
                out.push(Statement::let_(name.clone(), call(&allocate, vec![num(size + 32)])));
                out.push(Statement::expr(call("mstore", vec![ident(&name), num(u128::from(count))])));
                let copy = helpers.runtime(RuntimeHelper::CopyMemory);
                out.push(Statement::expr(call(
                    &copy,
                    vec![at, call("add", vec![ident(&name), num(32)]), num(size)],
                )));
            }
        }
        args.push(ident(&name));
        head += encoding.head_size();
    }
    Ok((out, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Mutability;
    use crate::compiler::types::NoNames;
    use crate::compiler::EvmVersion;

    fn meta(name: &str, params: &[(&str, &str)], returns: &[TypeDescriptor], mutability: Mutability) -> FunctionMeta {
        let params = params
            .iter()
            .map(|(n, t)| ParamMeta::resolve(n, t, &NoNames).unwrap())
            .collect();
        FunctionMeta::new(name, &format!("fun_{}", name), params, returns.to_vec(), mutability, &NoNames)
            .unwrap()
    }

    fn cases(stmts: &[Statement]) -> Vec<SwitchCase> {
        match &stmts[0] {
            Statement::If { body, .. } => match &body[0] {
                Statement::Switch { cases, .. } => cases.clone(),
                other => panic!("expected switch, got {:?}", other),
            },
            other => panic!("expected guard, got {:?}", other),
        }
    }

    #[test]
    fn test_cases_sorted_by_selector() {
        let mut helpers = HelperRegistry::new(EvmVersion::Cancun);
        let functions = vec![
            meta("transfer", &[("to", "address"), ("amount", "u256")], &[TypeDescriptor::Bool], Mutability::NonPayable),
            meta("balanceOf", &[("who", "address")], &[TypeDescriptor::UInt(256)], Mutability::View),
        ];
        let code = DispatcherBuilder::new(&mut helpers).build(&functions, None, None).unwrap();
        let selectors: Vec<Literal> = cases(&code).into_iter().map(|c| c.value).collect();
        assert_eq!(
            selectors,
            vec![
                Literal::Number("0x70a08231".into()),
                Literal::Number("0xa9059cbb".into()),
            ]
        );
        assert_eq!(code.last(), Some(&Statement::expr(call("revert", vec![num(0), num(0)]))));
    }

    #[test]
    fn test_payable_case_skips_value_check() {
        let mut helpers = HelperRegistry::new(EvmVersion::Cancun);
        let functions = vec![meta("deposit", &[], &[], Mutability::Payable)];
        let code = DispatcherBuilder::new(&mut helpers).build(&functions, None, None).unwrap();
        let body = &cases(&code)[0].body;
        assert_eq!(body[0], Statement::expr(call("fun_deposit", vec![])));
    }

    #[test]
    fn test_dynamic_param_uses_decoder_helper() {
        let mut helpers = HelperRegistry::new(EvmVersion::Cancun);
        let functions = vec![meta("setName", &[("name", "string")], &[], Mutability::NonPayable)];
        DispatcherBuilder::new(&mut helpers).build(&functions, None, None).unwrap();
        assert!(helpers.names().contains(&"abi_decode_calldata_dynamic".to_string()));
        assert!(helpers.names().contains(&"allocate_memory".to_string()));
    }

    #[test]
    fn test_fallback_replaces_final_revert() {
        let mut helpers = HelperRegistry::new(EvmVersion::Cancun);
        let fallback = SpecialEntry {
            ir_name: "fun_fallback".into(),
            payable: true,
        };
        let code = DispatcherBuilder::new(&mut helpers)
            .build(&[], None, Some(&fallback))
            .unwrap();
        assert_eq!(
            code,
            vec![
                Statement::expr(call("fun_fallback", vec![])),
                Statement::expr(call("stop", vec![])),
            ]
        );
    }

    #[test]
    fn test_constructor_args_from_code_tail() {
        let mut helpers = HelperRegistry::new(EvmVersion::Cancun);
        let params = vec![
            ParamMeta::resolve("supply", "u256", &NoNames).unwrap(),
            ParamMeta::resolve("name", "string", &NoNames).unwrap(),
        ];
        let (stmts, args) = decode_constructor_args("Token", &params, &mut helpers).unwrap();
        assert_eq!(args, vec![ident("ctorArg_0"), ident("ctorArg_1")]);
        assert_eq!(stmts.len(), 5);
    }
}
