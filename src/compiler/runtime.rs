//! # Runtime Support for Compiled Contracts
//!
//! Fixed helper functions emitted into the IR on first use: memory
//! allocation, slot hashing, storage copies of strings and arrays, calldata
//! decoding, revert encodings and low-level calls.
//!
//! Memory layout used by every helper:
//!
//! ```text
//! 0x00 - 0x3f   scratch space for hashing
//! 0x40          free memory pointer
//! 0x60          zero slot
//! 0x80 ...      allocations: [length][data...] for strings, bytes and arrays
//! ```

use super::ir::{call, ident, num, Expression, FunctionDef, Statement, SwitchCase, Literal};
use super::EvmVersion;

/// `Error(string)` selector
pub const ERROR_STRING_SELECTOR: u32 = 0x08c3_79a0;

/// `Panic(uint256)` selector
pub const PANIC_SELECTOR: u32 = 0x4e48_7b71;

/// Fixed runtime helper
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuntimeHelper {
    /// `allocate_memory(size) -> memPtr`
    AllocateMemory,
    /// `finalize_bytes(memPtr, end)`: store length, bump free pointer
    FinalizeBytes,
    /// `copy_memory(src, dst, length)`
    CopyMemory,
    /// `mapping_slot(key, slot) -> dataSlot`
    MappingSlot,
    /// `mapping_slot_bytes(key, slot) -> dataSlot` for string/bytes keys
    MappingSlotBytes,
    /// `array_data_slot(slot) -> data`
    ArrayDataSlot,
    /// `storage_array_index(slot, index, span) -> elemSlot`, bounds checked
    StorageArrayIndex,
    /// `storage_array_grow(slot, span) -> elemSlot`
    StorageArrayGrow,
    /// `storage_array_pop(slot, span)`
    StorageArrayPop,
    /// `storage_load_bytes(slot) -> memPtr`
    StorageLoadBytes,
    /// `storage_store_bytes(slot, memPtr)`
    StorageStoreBytes,
    /// `storage_load_words(slot, count) -> memPtr`
    StorageLoadWords,
    /// `storage_store_words(slot, memPtr, count)`
    StorageStoreWords,
    /// `storage_load_array(slot) -> memPtr`
    StorageLoadArray,
    /// `storage_store_array(slot, memPtr)`
    StorageStoreArray,
    /// `zero_storage(slot, count)`
    ZeroStorage,
    /// `memory_array_index(memPtr, index) -> addr`, bounds checked
    MemoryArrayIndex,
    /// `memory_byte_index(memPtr, index) -> addr`, bounds checked
    MemoryByteIndex,
    /// `abi_encode_item(head, base, tail, shape, value) -> newTail`
    AbiEncodeItem,
    /// `abi_decode_calldata_dynamic(headPos, unit) -> memPtr`
    AbiDecodeCalldataDynamic,
    /// `abi_decode_calldata_words(pos, count) -> memPtr` as `[count][words]`
    AbiDecodeCalldataWords,
    /// `returndata_to_memory() -> data`
    ReturndataToMemory,
    /// `revert_forward()`: bubble up returndata
    RevertForward,
    /// `revert_error_string(message)`: `Error(string)` revert
    RevertErrorString,
    /// `panic_error_0xNN()`
    Panic(u8),
    /// `string_concat(a, b) -> result`
    StringConcat,
    /// `string_equal(a, b) -> result`
    StringEqual,
    /// `bytes_hash(memPtr) -> hash`
    BytesHash,
    /// `lowlevel_call(target, value, data) -> success, ret`
    LowLevelCall,
    /// `lowlevel_staticcall(target, data) -> success, ret`
    LowLevelStaticCall,
    /// `lowlevel_delegatecall(target, data) -> success, ret`
    LowLevelDelegateCall,
}

/// Panic code for out-of-bounds access
pub const PANIC_OUT_OF_BOUNDS: u8 = 0x32;

/// Panic code for `pop()` on an empty array
pub const PANIC_EMPTY_POP: u8 = 0x31;

impl RuntimeHelper {
    /// IR function name
    pub fn name(&self) -> String {
        match self {
            RuntimeHelper::AllocateMemory => "allocate_memory".into(),
            RuntimeHelper::FinalizeBytes => "finalize_bytes".into(),
            RuntimeHelper::CopyMemory => "copy_memory".into(),
            RuntimeHelper::MappingSlot => "mapping_slot".into(),
            RuntimeHelper::MappingSlotBytes => "mapping_slot_bytes".into(),
            RuntimeHelper::ArrayDataSlot => "array_data_slot".into(),
            RuntimeHelper::StorageArrayIndex => "storage_array_index".into(),
            RuntimeHelper::StorageArrayGrow => "storage_array_grow".into(),
            RuntimeHelper::StorageArrayPop => "storage_array_pop".into(),
            RuntimeHelper::StorageLoadBytes => "storage_load_bytes".into(),
            RuntimeHelper::StorageStoreBytes => "storage_store_bytes".into(),
            RuntimeHelper::StorageLoadWords => "storage_load_words".into(),
            RuntimeHelper::StorageStoreWords => "storage_store_words".into(),
            RuntimeHelper::StorageLoadArray => "storage_load_array".into(),
            RuntimeHelper::StorageStoreArray => "storage_store_array".into(),
            RuntimeHelper::ZeroStorage => "zero_storage".into(),
            RuntimeHelper::MemoryArrayIndex => "memory_array_index".into(),
            RuntimeHelper::MemoryByteIndex => "memory_byte_index".into(),
            RuntimeHelper::AbiEncodeItem => "abi_encode_item".into(),
            RuntimeHelper::AbiDecodeCalldataDynamic => "abi_decode_calldata_dynamic".into(),
            RuntimeHelper::AbiDecodeCalldataWords => "abi_decode_calldata_words".into(),
            RuntimeHelper::ReturndataToMemory => "returndata_to_memory".into(),
            RuntimeHelper::RevertForward => "revert_forward".into(),
            RuntimeHelper::RevertErrorString => "revert_error_string".into(),
            RuntimeHelper::Panic(code) => format!("panic_error_0x{:02x}", code),
            RuntimeHelper::StringConcat => "string_concat".into(),
            RuntimeHelper::StringEqual => "string_equal".into(),
            RuntimeHelper::BytesHash => "bytes_hash".into(),
            RuntimeHelper::LowLevelCall => "lowlevel_call".into(),
            RuntimeHelper::LowLevelStaticCall => "lowlevel_staticcall".into(),
            RuntimeHelper::LowLevelDelegateCall => "lowlevel_delegatecall".into(),
        }
    }

    /// Helpers this one calls
    pub fn dependencies(&self) -> Vec<RuntimeHelper> {
        use RuntimeHelper::*;
        match self {
            MappingSlotBytes => vec![CopyMemory],
            StorageArrayIndex => vec![ArrayDataSlot, Panic(PANIC_OUT_OF_BOUNDS)],
            StorageArrayGrow => vec![ArrayDataSlot],
            StorageArrayPop => vec![ArrayDataSlot, Panic(PANIC_EMPTY_POP)],
            StorageLoadBytes => vec![AllocateMemory, ArrayDataSlot],
            StorageStoreBytes => vec![ArrayDataSlot],
            StorageLoadWords => vec![AllocateMemory],
            StorageLoadArray => vec![StorageLoadWords, ArrayDataSlot],
            StorageStoreArray => vec![ArrayDataSlot],
            MemoryArrayIndex | MemoryByteIndex => vec![Panic(PANIC_OUT_OF_BOUNDS)],
            AbiEncodeItem => vec![CopyMemory],
            AbiDecodeCalldataDynamic | AbiDecodeCalldataWords => vec![AllocateMemory],
            ReturndataToMemory => vec![AllocateMemory],
            RevertErrorString => vec![AbiEncodeItem],
            StringConcat => vec![AllocateMemory, CopyMemory],
            LowLevelCall | LowLevelStaticCall | LowLevelDelegateCall => vec![ReturndataToMemory],
            _ => Vec::new(),
        }
    }

    /// Build the function definition
    pub fn build(&self, evm: EvmVersion) -> FunctionDef {
        use RuntimeHelper::*;
        let name = self.name();
        match self {
            AllocateMemory => def(
                &name,
                &["size"],
                &["memPtr"],
                vec![
                    Statement::assign("memPtr", call("mload", vec![num(64)])),
                    mstore(num(64), add(ident("memPtr"), round_up(ident("size")))),
                ],
            ),
            FinalizeBytes => def(
                &name,
                &["memPtr", "end"],
                &[],
                vec![
                    mstore(
                        ident("memPtr"),
                        call("sub", vec![ident("end"), add(ident("memPtr"), num(32))]),
                    ),
                    mstore(num(64), round_up(ident("end"))),
                ],
            ),
            CopyMemory => {
                let body = match evm {
                    EvmVersion::Cancun => vec![Statement::expr(call(
                        "mcopy",
                        vec![ident("dst"), ident("src"), ident("length")],
                    ))],
                    EvmVersion::Shanghai => vec![word_loop(
                        "i",
                        ident("length"),
                        32,
                        vec![mstore(
                            add(ident("dst"), ident("i")),
                            call("mload", vec![add(ident("src"), ident("i"))]),
                        )],
                    )],
                };
                def(&name, &["src", "dst", "length"], &[], body)
            }
            MappingSlot => def(
                &name,
                &["key", "slot"],
                &["dataSlot"],
                vec![
                    mstore(num(0), ident("key")),
                    mstore(num(32), ident("slot")),
                    Statement::assign("dataSlot", call("keccak256", vec![num(0), num(64)])),
                ],
            ),
            MappingSlotBytes => def(
                &name,
                &["key", "slot"],
                &["dataSlot"],
                vec![
                    Statement::let_("length", call("mload", vec![ident("key")])),
                    Statement::let_("pos", call("mload", vec![num(64)])),
                    Statement::expr(call(
                        "copy_memory",
                        vec![add(ident("key"), num(32)), ident("pos"), ident("length")],
                    )),
                    mstore(add(ident("pos"), ident("length")), ident("slot")),
                    Statement::assign(
                        "dataSlot",
                        call(
                            "keccak256",
                            vec![ident("pos"), add(ident("length"), num(32))],
                        ),
                    ),
                ],
            ),
            ArrayDataSlot => def(
                &name,
                &["slot"],
                &["data"],
                vec![
                    mstore(num(0), ident("slot")),
                    Statement::assign("data", call("keccak256", vec![num(0), num(32)])),
                ],
            ),
            StorageArrayIndex => def(
                &name,
                &["slot", "index", "span"],
                &["elemSlot"],
                vec![
                    bounds_check(ident("index"), call("sload", vec![ident("slot")])),
                    Statement::assign(
                        "elemSlot",
                        add(
                            call("array_data_slot", vec![ident("slot")]),
                            call("mul", vec![ident("index"), ident("span")]),
                        ),
                    ),
                ],
            ),
            StorageArrayGrow => def(
                &name,
                &["slot", "span"],
                &["elemSlot"],
                vec![
                    Statement::let_("length", call("sload", vec![ident("slot")])),
                    sstore(ident("slot"), add(ident("length"), num(1))),
                    Statement::assign(
                        "elemSlot",
                        add(
                            call("array_data_slot", vec![ident("slot")]),
                            call("mul", vec![ident("length"), ident("span")]),
                        ),
                    ),
                ],
            ),
            StorageArrayPop => def(
                &name,
                &["slot", "span"],
                &[],
                vec![
                    Statement::let_("length", call("sload", vec![ident("slot")])),
                    Statement::if_(
                        call("iszero", vec![ident("length")]),
                        vec![Statement::expr(call(&Panic(PANIC_EMPTY_POP).name(), vec![]))],
                    ),
                    Statement::let_("newLength", call("sub", vec![ident("length"), num(1)])),
                    Statement::let_(
                        "elem",
                        add(
                            call("array_data_slot", vec![ident("slot")]),
                            call("mul", vec![ident("newLength"), ident("span")]),
                        ),
                    ),
                    word_loop(
                        "i",
                        ident("span"),
                        1,
                        vec![sstore(add(ident("elem"), ident("i")), num(0))],
                    ),
                    sstore(ident("slot"), ident("newLength")),
                ],
            ),
            StorageLoadBytes => def(
                &name,
                &["slot"],
                &["memPtr"],
                vec![
                    Statement::let_("length", call("sload", vec![ident("slot")])),
                    Statement::assign(
                        "memPtr",
                        call("allocate_memory", vec![add(ident("length"), num(32))]),
                    ),
                    mstore(ident("memPtr"), ident("length")),
                    Statement::let_("data", call("array_data_slot", vec![ident("slot")])),
                    word_loop(
                        "i",
                        ident("length"),
                        32,
                        vec![mstore(
                            add(add(ident("memPtr"), num(32)), ident("i")),
                            call(
                                "sload",
                                vec![add(ident("data"), call("div", vec![ident("i"), num(32)]))],
                            ),
                        )],
                    ),
                ],
            ),
            StorageStoreBytes => def(
                &name,
                &["slot", "memPtr"],
                &[],
                vec![
                    Statement::let_("length", call("mload", vec![ident("memPtr")])),
                    sstore(ident("slot"), ident("length")),
                    Statement::let_("data", call("array_data_slot", vec![ident("slot")])),
                    word_loop(
                        "i",
                        ident("length"),
                        32,
                        vec![sstore(
                            add(ident("data"), call("div", vec![ident("i"), num(32)])),
                            call(
                                "mload",
                                vec![add(add(ident("memPtr"), num(32)), ident("i"))],
                            ),
                        )],
                    ),
                ],
            ),
            StorageLoadWords => def(
                &name,
                &["slot", "count"],
                &["memPtr"],
                vec![
                    Statement::assign(
                        "memPtr",
                        call(
                            "allocate_memory",
                            vec![add(call("mul", vec![ident("count"), num(32)]), num(32))],
                        ),
                    ),
                    mstore(ident("memPtr"), ident("count")),
                    word_loop(
                        "i",
                        ident("count"),
                        1,
                        vec![mstore(
                            word_addr(ident("memPtr"), ident("i")),
                            call("sload", vec![add(ident("slot"), ident("i"))]),
                        )],
                    ),
                ],
            ),
            StorageStoreWords => def(
                &name,
                &["slot", "memPtr", "count"],
                &[],
                vec![word_loop(
                    "i",
                    ident("count"),
                    1,
                    vec![sstore(
                        add(ident("slot"), ident("i")),
                        call("mload", vec![word_addr(ident("memPtr"), ident("i"))]),
                    )],
                )],
            ),
            StorageLoadArray => def(
                &name,
                &["slot"],
                &["memPtr"],
                vec![Statement::assign(
                    "memPtr",
                    call(
                        "storage_load_words",
                        vec![
                            call("array_data_slot", vec![ident("slot")]),
                            call("sload", vec![ident("slot")]),
                        ],
                    ),
                )],
            ),
            StorageStoreArray => def(
                &name,
                &["slot", "memPtr"],
                &[],
                vec![
                    Statement::let_("length", call("mload", vec![ident("memPtr")])),
                    sstore(ident("slot"), ident("length")),
                    Statement::let_("data", call("array_data_slot", vec![ident("slot")])),
                    word_loop(
                        "i",
                        ident("length"),
                        1,
                        vec![sstore(
                            add(ident("data"), ident("i")),
                            call("mload", vec![word_addr(ident("memPtr"), ident("i"))]),
                        )],
                    ),
                ],
            ),
            ZeroStorage => def(
                &name,
                &["slot", "count"],
                &[],
                vec![word_loop(
                    "i",
                    ident("count"),
                    1,
                    vec![sstore(add(ident("slot"), ident("i")), num(0))],
                )],
            ),
            MemoryArrayIndex => def(
                &name,
                &["memPtr", "index"],
                &["addr"],
                vec![
                    bounds_check(ident("index"), call("mload", vec![ident("memPtr")])),
                    Statement::assign("addr", word_addr(ident("memPtr"), ident("index"))),
                ],
            ),
            MemoryByteIndex => def(
                &name,
                &["memPtr", "index"],
                &["addr"],
                vec![
                    bounds_check(ident("index"), call("mload", vec![ident("memPtr")])),
                    Statement::assign(
                        "addr",
                        add(add(ident("memPtr"), num(32)), ident("index")),
                    ),
                ],
            ),
            AbiEncodeItem => {
                let dynamic = vec![
                    mstore(
                        ident("head"),
                        call("sub", vec![ident("tail"), ident("base")]),
                    ),
                    Statement::let_("length", call("mload", vec![ident("value")])),
                    Statement::let_("size", ident("length")),
                    Statement::if_(
                        call("eq", vec![ident("shape"), num(2)]),
                        vec![Statement::assign(
                            "size",
                            call("mul", vec![ident("length"), num(32)]),
                        )],
                    ),
                    mstore(ident("tail"), ident("length")),
                    Statement::expr(call(
                        "copy_memory",
                        vec![
                            add(ident("value"), num(32)),
                            add(ident("tail"), num(32)),
                            ident("size"),
                        ],
                    )),
                    mstore(add(add(ident("tail"), num(32)), ident("size")), num(0)),
                    Statement::assign(
                        "newTail",
                        add(add(ident("tail"), num(32)), round_up(ident("size"))),
                    ),
                ];
                def(
                    &name,
                    &["head", "base", "tail", "shape", "value"],
                    &["newTail"],
                    vec![
                        Statement::assign("newTail", ident("tail")),
                        Statement::Switch {
                            expr: ident("shape"),
                            cases: vec![SwitchCase {
                                value: Literal::Number("0".into()),
                                body: vec![mstore(ident("head"), ident("value"))],
                            }],
                            default: Some(dynamic),
                        },
                    ],
                )
            }
            AbiDecodeCalldataDynamic => def(
                &name,
                &["headPos", "unit"],
                &["memPtr"],
                vec![
                    Statement::let_(
                        "offset",
                        add(num(4), call("calldataload", vec![ident("headPos")])),
                    ),
                    Statement::let_("length", call("calldataload", vec![ident("offset")])),
                    Statement::let_("size", call("mul", vec![ident("length"), ident("unit")])),
                    Statement::assign(
                        "memPtr",
                        call("allocate_memory", vec![add(ident("size"), num(32))]),
                    ),
                    mstore(ident("memPtr"), ident("length")),
                    Statement::expr(call(
                        "calldatacopy",
                        vec![
                            add(ident("memPtr"), num(32)),
                            add(ident("offset"), num(32)),
                            ident("size"),
                        ],
                    )),
                ],
            ),
            AbiDecodeCalldataWords => def(
                &name,
                &["pos", "count"],
                &["memPtr"],
                vec![
                    Statement::let_("size", call("mul", vec![ident("count"), num(32)])),
                    Statement::assign(
                        "memPtr",
                        call("allocate_memory", vec![add(ident("size"), num(32))]),
                    ),
                    mstore(ident("memPtr"), ident("count")),
                    Statement::expr(call(
                        "calldatacopy",
                        vec![add(ident("memPtr"), num(32)), ident("pos"), ident("size")],
                    )),
                ],
            ),
            ReturndataToMemory => def(
                &name,
                &[],
                &["data"],
                vec![
                    Statement::let_("size", call("returndatasize", vec![])),
                    Statement::assign(
                        "data",
                        call("allocate_memory", vec![add(ident("size"), num(32))]),
                    ),
                    mstore(ident("data"), ident("size")),
                    Statement::expr(call(
                        "returndatacopy",
                        vec![add(ident("data"), num(32)), num(0), ident("size")],
                    )),
                ],
            ),
            RevertForward => def(
                &name,
                &[],
                &[],
                vec![
                    Statement::let_("pos", call("mload", vec![num(64)])),
                    Statement::expr(call(
                        "returndatacopy",
                        vec![ident("pos"), num(0), call("returndatasize", vec![])],
                    )),
                    Statement::expr(call(
                        "revert",
                        vec![ident("pos"), call("returndatasize", vec![])],
                    )),
                ],
            ),
            RevertErrorString => def(
                &name,
                &["message"],
                &[],
                vec![
                    Statement::let_("pos", call("mload", vec![num(64)])),
                    mstore(ident("pos"), selector_word(ERROR_STRING_SELECTOR)),
                    Statement::let_(
                        "end",
                        call(
                            "abi_encode_item",
                            vec![
                                add(ident("pos"), num(4)),
                                add(ident("pos"), num(4)),
                                add(ident("pos"), num(36)),
                                num(1),
                                ident("message"),
                            ],
                        ),
                    ),
                    Statement::expr(call(
                        "revert",
                        vec![ident("pos"), call("sub", vec![ident("end"), ident("pos")])],
                    )),
                ],
            ),
            Panic(code) => def(
                &name,
                &[],
                &[],
                vec![
                    mstore(num(0), selector_word(PANIC_SELECTOR)),
                    mstore(num(4), num(u128::from(*code))),
                    Statement::expr(call("revert", vec![num(0), num(0x24)])),
                ],
            ),
            StringConcat => def(
                &name,
                &["a", "b"],
                &["result"],
                vec![
                    Statement::let_("la", call("mload", vec![ident("a")])),
                    Statement::let_("lb", call("mload", vec![ident("b")])),
                    Statement::assign(
                        "result",
                        call(
                            "allocate_memory",
                            vec![add(add(ident("la"), ident("lb")), num(32))],
                        ),
                    ),
                    mstore(ident("result"), add(ident("la"), ident("lb"))),
                    Statement::expr(call(
                        "copy_memory",
                        vec![
                            add(ident("a"), num(32)),
                            add(ident("result"), num(32)),
                            ident("la"),
                        ],
                    )),
                    Statement::expr(call(
                        "copy_memory",
                        vec![
                            add(ident("b"), num(32)),
                            add(add(ident("result"), num(32)), ident("la")),
                            ident("lb"),
                        ],
                    )),
                ],
            ),
            StringEqual => def(
                &name,
                &["a", "b"],
                &["result"],
                vec![Statement::assign(
                    "result",
                    call(
                        "and",
                        vec![
                            call(
                                "eq",
                                vec![call("mload", vec![ident("a")]), call("mload", vec![ident("b")])],
                            ),
                            call("eq", vec![hash_of(ident("a")), hash_of(ident("b"))]),
                        ],
                    ),
                )],
            ),
            BytesHash => def(
                &name,
                &["memPtr"],
                &["hash"],
                vec![Statement::assign("hash", hash_of(ident("memPtr")))],
            ),
            LowLevelCall => lowlevel(&name, "call", true),
            LowLevelStaticCall => lowlevel(&name, "staticcall", false),
            LowLevelDelegateCall => lowlevel(&name, "delegatecall", false),
        }
    }
}

fn def(name: &str, params: &[&str], returns: &[&str], body: Vec<Statement>) -> FunctionDef {
    FunctionDef {
        name: name.to_string(),
        params: params.iter().map(|p| p.to_string()).collect(),
        returns: returns.iter().map(|r| r.to_string()).collect(),
        body,
    }
}

fn lowlevel(name: &str, opcode: &str, with_value: bool) -> FunctionDef {
    let mut args = vec![call("gas", vec![]), ident("target")];
    if with_value {
        args.push(ident("value"));
    }
    args.extend([
        add(ident("data"), num(32)),
        call("mload", vec![ident("data")]),
        num(0),
        num(0),
    ]);
    let params: &[&str] = if with_value {
        &["target", "value", "data"]
    } else {
        &["target", "data"]
    };
    def(
        name,
        params,
        &["success", "ret"],
        vec![
            Statement::assign("success", call(opcode, args)),
            Statement::assign("ret", call("returndata_to_memory", vec![])),
        ],
    )
}

fn add(a: Expression, b: Expression) -> Expression {
    call("add", vec![a, b])
}

fn mstore(addr: Expression, value: Expression) -> Statement {
    Statement::expr(call("mstore", vec![addr, value]))
}

fn sstore(slot: Expression, value: Expression) -> Statement {
    Statement::expr(call("sstore", vec![slot, value]))
}

/// `(x + 31) & ~31`
pub fn round_up(x: Expression) -> Expression {
    call("and", vec![add(x, num(31)), call("not", vec![num(31)])])
}

/// Address of word `i` after a length prefix
fn word_addr(ptr: Expression, i: Expression) -> Expression {
    add(add(ptr, num(32)), call("mul", vec![i, num(32)]))
}

fn hash_of(ptr: Expression) -> Expression {
    call(
        "keccak256",
        vec![add(ptr.clone(), num(32)), call("mload", vec![ptr])],
    )
}

/// Selector shifted into the high four bytes of a word
pub fn selector_word(selector: u32) -> Expression {
    call(
        "shl",
        vec![num(224), Expression::num_text(format!("0x{:08x}", selector))],
    )
}

/// `if iszero(lt(index, length)) { panic_error_0x32() }`
pub fn bounds_check(index: Expression, length: Expression) -> Statement {
    Statement::if_(
        call("iszero", vec![call("lt", vec![index, length])]),
        vec![Statement::expr(call(
            &RuntimeHelper::Panic(PANIC_OUT_OF_BOUNDS).name(),
            vec![],
        ))],
    )
}

/// `for { let v := 0 } lt(v, bound) { v := add(v, step) } { body }`
fn word_loop(var: &str, bound: Expression, step: u128, body: Vec<Statement>) -> Statement {
    Statement::For {
        init: vec![Statement::let_(var, num(0))],
        condition: call("lt", vec![ident(var), bound]),
        post: vec![Statement::assign(var, add(ident(var), num(step)))],
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_dependencies() {
        assert_eq!(RuntimeHelper::Panic(0x32).name(), "panic_error_0x32");
        assert_eq!(RuntimeHelper::MappingSlot.name(), "mapping_slot");
        assert!(RuntimeHelper::StorageLoadArray
            .dependencies()
            .contains(&RuntimeHelper::StorageLoadWords));
    }

    #[test]
    fn test_mapping_slot_body() {
        let f = RuntimeHelper::MappingSlot.build(EvmVersion::Cancun);
        assert_eq!(f.params, vec!["key", "slot"]);
        assert_eq!(f.returns, vec!["dataSlot"]);
        assert_eq!(f.body.len(), 3);
    }

    #[test]
    fn test_copy_memory_depends_on_target() {
        let cancun = RuntimeHelper::CopyMemory.build(EvmVersion::Cancun);
        assert!(matches!(
            &cancun.body[0],
            Statement::Expression(Expression::Call { name, .. }) if name == "mcopy"
        ));
        let shanghai = RuntimeHelper::CopyMemory.build(EvmVersion::Shanghai);
        assert!(matches!(&shanghai.body[0], Statement::For { .. }));
    }

    #[test]
    fn test_panic_encoding() {
        let f = RuntimeHelper::Panic(0x32).build(EvmVersion::Cancun);
        assert_eq!(
            f.body[1],
            Statement::expr(call("mstore", vec![num(4), num(0x32)]))
        );
    }
}
