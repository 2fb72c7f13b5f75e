//! Binary serialization of compiled templates.
//!
//! The persisted layout starts with a four byte magic (`v` `j` `2` plus a
//! format version byte) followed by the 64-bit source checksum.  After the
//! header come the length prefixed pools (constants, strings, names), the
//! instruction array, the line table and the block table.  All integers
//! are little-endian.
//!
//! Readers treat any mismatch (magic, version, checksum, truncation) as a
//! cache miss by returning `None`, never as an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::compiler::ast::CmpOp;
use crate::compiler::instructions::{Bytecode, Instr, LineInfo};
use crate::output::CaptureMode;
use crate::template::CompiledTemplate;
use crate::value::{UndefinedPolicy, Value, ValueMap, ValueRepr};

/// The first three bytes of a serialized template.
pub const MAGIC: [u8; 3] = *b"vj2";

/// The version byte of the current format.
pub const VERSION: u8 = 1;

/// A stable FNV-1a 64 hash used for source checksums and cache keys.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Computes the checksum of template source.
pub fn source_checksum(source: &str) -> u64 {
    fnv1a64(source.as_bytes())
}

/// Computes the stable cache key for a template.
pub fn cache_key(name: &str, filename: Option<&str>) -> u64 {
    let mut buf = Vec::with_capacity(name.len() + 1);
    buf.extend_from_slice(name.as_bytes());
    if let Some(filename) = filename {
        buf.push(0);
        buf.extend_from_slice(filename.as_bytes());
    }
    fnv1a64(&buf)
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Writer {
        Writer { buf: Vec::new() }
    }

    fn u8(&mut self, val: u8) {
        self.buf.push(val);
    }

    fn u16(&mut self, val: u16) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    fn u32(&mut self, val: u32) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    fn u64(&mut self, val: u64) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    fn i64(&mut self, val: i64) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    fn f64(&mut self, val: f64) {
        self.buf.extend_from_slice(&val.to_bits().to_le_bytes());
    }

    fn str(&mut self, val: &str) {
        self.u32(val.len() as u32);
        self.buf.extend_from_slice(val.as_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Reader<'a> {
        Reader { buf, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let rv = some!(self.buf.get(self.pos..self.pos + len));
        self.pos += len;
        Some(rv)
    }

    fn u8(&mut self) -> Option<u8> {
        self.bytes(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.bytes(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        self.bytes(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Option<u64> {
        self.bytes(8).map(|b| {
            u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
        })
    }

    fn i64(&mut self) -> Option<i64> {
        self.u64().map(|v| v as i64)
    }

    fn f64(&mut self) -> Option<f64> {
        self.u64().map(f64::from_bits)
    }

    fn str(&mut self) -> Option<String> {
        let len = some!(self.u32()) as usize;
        let bytes = some!(self.bytes(len));
        String::from_utf8(bytes.to_vec()).ok()
    }
}

const VALUE_NONE: u8 = 0;
const VALUE_BOOL: u8 = 1;
const VALUE_INT: u8 = 2;
const VALUE_FLOAT: u8 = 3;
const VALUE_STRING: u8 = 4;
const VALUE_MARKUP: u8 = 5;
const VALUE_LIST: u8 = 6;
const VALUE_DICT: u8 = 7;
const VALUE_UNDEFINED: u8 = 8;

fn write_value(w: &mut Writer, value: &Value) {
    match value.0 {
        ValueRepr::None => w.u8(VALUE_NONE),
        ValueRepr::Undefined(..) => w.u8(VALUE_UNDEFINED),
        ValueRepr::Bool(val) => {
            w.u8(VALUE_BOOL);
            w.u8(val as u8);
        }
        ValueRepr::Int(val) => {
            w.u8(VALUE_INT);
            w.i64(val);
        }
        ValueRepr::Float(val) => {
            w.u8(VALUE_FLOAT);
            w.f64(val);
        }
        ValueRepr::String(ref val) => {
            w.u8(VALUE_STRING);
            w.str(val);
        }
        ValueRepr::Markup(ref val) => {
            w.u8(VALUE_MARKUP);
            w.str(val);
        }
        ValueRepr::List(ref items) => {
            w.u8(VALUE_LIST);
            w.u32(items.len() as u32);
            for item in items.iter() {
                write_value(w, item);
            }
        }
        ValueRepr::Dict(ref map, _) => {
            w.u8(VALUE_DICT);
            w.u32(map.len() as u32);
            for (key, item) in map.iter() {
                w.str(key);
                write_value(w, item);
            }
        }
        // callables and custom objects never appear in constant pools;
        // downgrade them to their string rendition if they ever do.
        _ => {
            w.u8(VALUE_STRING);
            w.str(&value.to_string());
        }
    }
}

fn read_value(r: &mut Reader) -> Option<Value> {
    Some(match some!(r.u8()) {
        VALUE_NONE => Value::from(()),
        VALUE_UNDEFINED => Value(ValueRepr::Undefined(None, UndefinedPolicy::Lenient)),
        VALUE_BOOL => Value::from(some!(r.u8()) != 0),
        VALUE_INT => Value::from(some!(r.i64())),
        VALUE_FLOAT => Value::from(some!(r.f64())),
        VALUE_STRING => Value::from(some!(r.str())),
        VALUE_MARKUP => Value::from_safe_string(some!(r.str())),
        VALUE_LIST => {
            let len = some!(r.u32()) as usize;
            let mut items = Vec::with_capacity(crate::utils::untrusted_size_hint(len));
            for _ in 0..len {
                items.push(some!(read_value(r)));
            }
            Value::from(items)
        }
        VALUE_DICT => {
            let len = some!(r.u32()) as usize;
            let mut map = ValueMap::new();
            for _ in 0..len {
                let key = some!(r.str());
                map.insert(Arc::from(key), some!(read_value(r)));
            }
            Value::from_value_map(map)
        }
        _ => return None,
    })
}

fn cmp_op_code(op: CmpOp) -> u8 {
    match op {
        CmpOp::Eq => 0,
        CmpOp::Ne => 1,
        CmpOp::Lt => 2,
        CmpOp::Lte => 3,
        CmpOp::Gt => 4,
        CmpOp::Gte => 5,
        CmpOp::In => 6,
        CmpOp::NotIn => 7,
    }
}

fn cmp_op_from_code(code: u8) -> Option<CmpOp> {
    Some(match code {
        0 => CmpOp::Eq,
        1 => CmpOp::Ne,
        2 => CmpOp::Lt,
        3 => CmpOp::Lte,
        4 => CmpOp::Gt,
        5 => CmpOp::Gte,
        6 => CmpOp::In,
        7 => CmpOp::NotIn,
        _ => return None,
    })
}

fn write_instr(w: &mut Writer, instr: &Instr) {
    match *instr {
        Instr::EmitText(a) => {
            w.u8(0);
            w.u32(a);
        }
        Instr::Output(a) => {
            w.u8(1);
            w.u16(a);
        }
        Instr::LoadConst(a) => {
            w.u8(2);
            w.u32(a);
        }
        Instr::Lookup(a) => {
            w.u8(3);
            w.u32(a);
        }
        Instr::StoreVar(a) => {
            w.u8(4);
            w.u32(a);
        }
        Instr::GetAttr(a) => {
            w.u8(5);
            w.u32(a);
        }
        Instr::SetAttr(a) => {
            w.u8(6);
            w.u32(a);
        }
        Instr::GetItem => w.u8(7),
        Instr::Slice => w.u8(8),
        Instr::BuildList(a) => {
            w.u8(9);
            w.u16(a);
        }
        Instr::BuildMap(a) => {
            w.u8(10);
            w.u16(a);
        }
        Instr::BuildKwargs(a) => {
            w.u8(11);
            w.u16(a);
        }
        Instr::UnpackList(a) => {
            w.u8(12);
            w.u16(a);
        }
        Instr::ListAppend => w.u8(13),
        Instr::Add => w.u8(14),
        Instr::Sub => w.u8(15),
        Instr::Mul => w.u8(16),
        Instr::Div => w.u8(17),
        Instr::IntDiv => w.u8(18),
        Instr::Rem => w.u8(19),
        Instr::Pow => w.u8(20),
        Instr::Neg => w.u8(21),
        Instr::Not => w.u8(22),
        Instr::StringConcat => w.u8(23),
        Instr::Cmp(op) => {
            w.u8(24);
            w.u8(cmp_op_code(op));
        }
        Instr::Jump(a) => {
            w.u8(25);
            w.u32(a);
        }
        Instr::JumpIfFalse(a) => {
            w.u8(26);
            w.u32(a);
        }
        Instr::JumpIfFalseOrPop(a) => {
            w.u8(27);
            w.u32(a);
        }
        Instr::JumpIfTrueOrPop(a) => {
            w.u8(28);
            w.u32(a);
        }
        Instr::PushLoop(a) => {
            w.u8(29);
            w.u8(a);
        }
        Instr::Iterate(a) => {
            w.u8(30);
            w.u32(a);
        }
        Instr::PushDidNotIterate => w.u8(31),
        Instr::PushWith => w.u8(32),
        Instr::PopFrame => w.u8(33),
        Instr::PopLoopFrame => w.u8(34),
        Instr::PushAutoEscape => w.u8(35),
        Instr::PopAutoEscape => w.u8(36),
        Instr::BeginCapture(mode) => {
            w.u8(37);
            w.u8(match mode {
                CaptureMode::Capture => 0,
                CaptureMode::Discard => 1,
            });
        }
        Instr::EndCapture => w.u8(38),
        Instr::ApplyFilter(a, b) => {
            w.u8(39);
            w.u32(a);
            w.u16(b);
        }
        Instr::PerformTest(a, b) => {
            w.u8(40);
            w.u32(a);
            w.u16(b);
        }
        Instr::CallFunction(a, b) => {
            w.u8(41);
            w.u32(a);
            w.u16(b);
        }
        Instr::CallMethod(a, b) => {
            w.u8(42);
            w.u32(a);
            w.u16(b);
        }
        Instr::CallObject(a) => {
            w.u8(43);
            w.u16(a);
        }
        Instr::DupTop => w.u8(44),
        Instr::DiscardTop => w.u8(45),
        Instr::Swap => w.u8(46),
        Instr::Rot3 => w.u8(47),
        Instr::FastSuper => w.u8(48),
        Instr::FastRecurse => w.u8(49),
        Instr::CallBlock(a) => {
            w.u8(50);
            w.u32(a);
        }
        Instr::LoadBlocks => w.u8(51),
        Instr::Include {
            ignore_missing,
            with_context,
        } => {
            w.u8(52);
            w.u8((ignore_missing as u8) | ((with_context as u8) << 1));
        }
        Instr::ImportModule => w.u8(53),
        Instr::BuildMacro(a, b, c) => {
            w.u8(54);
            w.u32(a);
            w.u32(b);
            w.u8(c);
        }
        Instr::EmitDebug => w.u8(55),
        Instr::Return => w.u8(56),
    }
}

fn read_instr(r: &mut Reader) -> Option<Instr> {
    Some(match some!(r.u8()) {
        0 => Instr::EmitText(some!(r.u32())),
        1 => Instr::Output(some!(r.u16())),
        2 => Instr::LoadConst(some!(r.u32())),
        3 => Instr::Lookup(some!(r.u32())),
        4 => Instr::StoreVar(some!(r.u32())),
        5 => Instr::GetAttr(some!(r.u32())),
        6 => Instr::SetAttr(some!(r.u32())),
        7 => Instr::GetItem,
        8 => Instr::Slice,
        9 => Instr::BuildList(some!(r.u16())),
        10 => Instr::BuildMap(some!(r.u16())),
        11 => Instr::BuildKwargs(some!(r.u16())),
        12 => Instr::UnpackList(some!(r.u16())),
        13 => Instr::ListAppend,
        14 => Instr::Add,
        15 => Instr::Sub,
        16 => Instr::Mul,
        17 => Instr::Div,
        18 => Instr::IntDiv,
        19 => Instr::Rem,
        20 => Instr::Pow,
        21 => Instr::Neg,
        22 => Instr::Not,
        23 => Instr::StringConcat,
        24 => Instr::Cmp(some!(cmp_op_from_code(some!(r.u8())))),
        25 => Instr::Jump(some!(r.u32())),
        26 => Instr::JumpIfFalse(some!(r.u32())),
        27 => Instr::JumpIfFalseOrPop(some!(r.u32())),
        28 => Instr::JumpIfTrueOrPop(some!(r.u32())),
        29 => Instr::PushLoop(some!(r.u8())),
        30 => Instr::Iterate(some!(r.u32())),
        31 => Instr::PushDidNotIterate,
        32 => Instr::PushWith,
        33 => Instr::PopFrame,
        34 => Instr::PopLoopFrame,
        35 => Instr::PushAutoEscape,
        36 => Instr::PopAutoEscape,
        37 => Instr::BeginCapture(match some!(r.u8()) {
            0 => CaptureMode::Capture,
            1 => CaptureMode::Discard,
            _ => return None,
        }),
        38 => Instr::EndCapture,
        39 => Instr::ApplyFilter(some!(r.u32()), some!(r.u16())),
        40 => Instr::PerformTest(some!(r.u32()), some!(r.u16())),
        41 => Instr::CallFunction(some!(r.u32()), some!(r.u16())),
        42 => Instr::CallMethod(some!(r.u32()), some!(r.u16())),
        43 => Instr::CallObject(some!(r.u16())),
        44 => Instr::DupTop,
        45 => Instr::DiscardTop,
        46 => Instr::Swap,
        47 => Instr::Rot3,
        48 => Instr::FastSuper,
        49 => Instr::FastRecurse,
        50 => Instr::CallBlock(some!(r.u32())),
        51 => Instr::LoadBlocks,
        52 => {
            let flags = some!(r.u8());
            Instr::Include {
                ignore_missing: flags & 1 != 0,
                with_context: flags & 2 != 0,
            }
        }
        53 => Instr::ImportModule,
        54 => Instr::BuildMacro(some!(r.u32()), some!(r.u32()), some!(r.u8())),
        55 => Instr::EmitDebug,
        56 => Instr::Return,
        _ => return None,
    })
}

fn write_bytecode(w: &mut Writer, code: &Bytecode) {
    w.str(code.name());
    w.u32(code.consts.len() as u32);
    for value in &code.consts {
        write_value(w, value);
    }
    w.u32(code.strings.len() as u32);
    for string in &code.strings {
        w.str(string);
    }
    w.u32(code.names.len() as u32);
    for name in &code.names {
        w.str(name);
    }
    w.u32(code.instructions.len() as u32);
    for instr in &code.instructions {
        write_instr(w, instr);
    }
    w.u32(code.line_infos.len() as u32);
    for line_info in &code.line_infos {
        w.u32(line_info.first_instruction);
        w.u32(line_info.line);
    }
}

fn read_bytecode(r: &mut Reader) -> Option<Bytecode> {
    let name = some!(r.str());
    let mut code = Bytecode::new(&name);
    let const_count = some!(r.u32()) as usize;
    for _ in 0..const_count {
        let value = some!(read_value(r));
        code.consts.push(value);
    }
    let string_count = some!(r.u32()) as usize;
    for _ in 0..string_count {
        code.strings.push(Arc::from(some!(r.str())));
    }
    let name_count = some!(r.u32()) as usize;
    for _ in 0..name_count {
        code.names.push(Arc::from(some!(r.str())));
    }
    let instr_count = some!(r.u32()) as usize;
    for _ in 0..instr_count {
        code.instructions.push(some!(read_instr(r)));
    }
    let line_count = some!(r.u32()) as usize;
    for _ in 0..line_count {
        code.line_infos.push(LineInfo {
            first_instruction: some!(r.u32()),
            line: some!(r.u32()),
        });
    }
    Some(code)
}

/// Serializes a compiled template for the bytecode cache.
pub fn serialize(template: &CompiledTemplate) -> Vec<u8> {
    let mut w = Writer::new();
    w.buf.extend_from_slice(&MAGIC);
    w.u8(VERSION);
    w.u64(template.checksum);
    write_bytecode(&mut w, &template.bytecode);
    w.u32(template.blocks.len() as u32);
    for (name, code) in &template.blocks {
        w.str(name);
        write_bytecode(&mut w, code);
    }
    w.buf
}

/// Deserializes a compiled template.
///
/// Returns `None` on magic, version or checksum mismatch and on any kind
/// of truncation or corruption.  The source is required to re-attach the
/// original template text.
pub fn deserialize(bytes: &[u8], expected_checksum: u64, source: &str) -> Option<CompiledTemplate> {
    let mut r = Reader::new(bytes);
    if some!(r.bytes(3)) != MAGIC {
        return None;
    }
    if some!(r.u8()) != VERSION {
        return None;
    }
    if some!(r.u64()) != expected_checksum {
        return None;
    }
    let bytecode = some!(read_bytecode(&mut r));
    let block_count = some!(r.u32()) as usize;
    let mut blocks = BTreeMap::new();
    for _ in 0..block_count {
        let name: Arc<str> = Arc::from(some!(r.str()));
        blocks.insert(name, Arc::new(some!(read_bytecode(&mut r))));
    }
    Some(CompiledTemplate {
        name: bytecode.name.clone(),
        source: source.to_string(),
        checksum: expected_checksum,
        bytecode: Arc::new(bytecode),
        blocks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_fnv_stability() {
        assert_eq!(fnv1a64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a64(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn test_value_roundtrip() {
        let values = vec![
            Value::from(()),
            Value::from(true),
            Value::from(42),
            Value::from(1.5),
            Value::from("hello"),
            Value::from_safe_string("<b>".into()),
            Value::from(vec![1, 2, 3]),
        ];
        for value in values {
            let mut w = Writer::new();
            write_value(&mut w, &value);
            let mut r = Reader::new(&w.buf);
            assert_eq!(read_value(&mut r), Some(value));
        }
    }

    #[test]
    fn test_template_roundtrip() {
        let env = crate::Environment::new();
        let source = "{% block title %}Hello{% endblock %} {% for x in items %}{{ x|upper }}{% endfor %}";
        let template = CompiledTemplate::new("test.txt", source, &env).unwrap();
        let payload = serialize(&template);
        let restored = deserialize(&payload, template.checksum, source).unwrap();
        assert_eq!(*restored.bytecode, *template.bytecode);
        assert_eq!(restored.blocks.len(), template.blocks.len());
        for (name, code) in &template.blocks {
            assert_eq!(**code, **restored.blocks.get(name).unwrap());
        }
        // checksum mismatch is a miss
        assert!(deserialize(&payload, template.checksum ^ 1, source).is_none());
    }

    #[test]
    fn test_truncated_is_miss() {
        let mut w = Writer::new();
        w.buf.extend_from_slice(&MAGIC);
        w.u8(VERSION);
        w.u64(0);
        assert!(deserialize(&w.buf, 0, "").is_none());
        assert!(deserialize(b"xxx", 0, "").is_none());
    }
}
