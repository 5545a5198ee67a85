use std::collections::BTreeMap;
use std::string::{String, ToString};
use std::vec::Vec;

use pretty_assertions::assert_eq;

use super::*;
use crate::RegionError;
use crate::handler::ThreadId;
use crate::aml::decoder::encode_pkg_length;
use crate::aml::opcode::*;

/// Byte-addressed memory for every region space, plus a notification log.
#[derive(Default)]
struct Memory {
    bytes: spin::Mutex<BTreeMap<u64, u8>>,
    notified: spin::Mutex<Vec<(String, u64)>>,
}

impl Memory {
    fn with(contents: &[(u64, u8)]) -> Self {
        let memory = Self::default();
        memory.bytes.lock().extend(contents.iter().copied());
        memory
    }

    fn byte(&self, address: u64) -> u8 {
        self.bytes.lock().get(&address).copied().unwrap_or(0)
    }
}

impl Handler for Memory {
    fn read_region(&self, _: RegionSpace, address: u64, width: AccessWidth) -> Result<u64, RegionError> {
        let bytes = self.bytes.lock();
        Ok((0..width.bytes()).fold(0, |acc, i| {
            acc | u64::from(bytes.get(&(address + i)).copied().unwrap_or(0)) << (i * 8)
        }))
    }

    fn write_region(
        &self,
        _: RegionSpace,
        address: u64,
        width: AccessWidth,
        value: u64,
    ) -> Result<(), RegionError> {
        let mut bytes = self.bytes.lock();
        for i in 0..width.bytes() {
            bytes.insert(address + i, (value >> (i * 8)) as u8);
        }
        Ok(())
    }

    fn current_thread(&self) -> ThreadId {
        ThreadId(1)
    }

    fn uptime_ms(&self) -> u64 {
        0
    }

    fn notify(&self, device: &AmlName, value: u64) {
        self.notified.lock().push((device.to_string(), value));
    }
}

fn pkg(lead: &[u8], body: &[u8]) -> Vec<u8> {
    let mut len = body.len() + 1;
    loop {
        let (bytes, n) = encode_pkg_length(len).unwrap();
        if body.len() + n == len {
            return [lead, &bytes[..n], body].concat();
        }
        len = body.len() + n;
    }
}

fn method(name: &[u8; 4], flags: u8, body: &[u8]) -> Vec<u8> {
    pkg(&[METHOD_OP], &[name.as_slice(), &[flags], body].concat())
}

fn table(revision: u8, body: &[u8]) -> Vec<u8> {
    let mut t = Vec::new();
    t.extend_from_slice(b"DSDT");
    t.extend_from_slice(&((36 + body.len()) as u32).to_le_bytes());
    t.push(revision);
    t.push(0);
    t.extend_from_slice(b"HADRON");
    t.extend_from_slice(b"UNITTEST");
    t.extend_from_slice(&1u32.to_le_bytes());
    t.extend_from_slice(b"HAML");
    t.extend_from_slice(&1u32.to_le_bytes());
    t.extend_from_slice(body);
    t
}

fn load(body: &[u8]) -> Interpreter<Memory> {
    load_with(Memory::default(), InterpreterConfig::default(), 2, body)
}

fn load_with(
    memory: Memory,
    config: InterpreterConfig,
    revision: u8,
    body: &[u8],
) -> Interpreter<Memory> {
    let interp = Interpreter::new(memory, config);
    interp.load_table(&table(revision, body)).unwrap();
    interp
}

#[test_log::test]
fn while_loop_counts_to_five() {
    let body = [
        &[STORE_OP, ZERO_OP, LOCAL0_OP][..],
        &pkg(&[WHILE_OP], &[LLESS_OP, LOCAL0_OP, BYTE_PREFIX, 5, INCREMENT_OP, LOCAL0_OP]),
        &[RETURN_OP, LOCAL0_OP],
    ]
    .concat();
    let interp = load(&method(b"MAIN", 0, &body));
    assert_eq!(interp.evaluate("\\MAIN", &[]).unwrap(), Object::Integer(5));
}

#[test]
fn break_and_continue() {
    // While (Local0 < 10) { Local0++; if 3: continue; if 6: break; Local1 += Local0 }
    let loop_body = [
        &[LLESS_OP, LOCAL0_OP, BYTE_PREFIX, 10, INCREMENT_OP, LOCAL0_OP][..],
        &pkg(&[IF_OP], &[LEQUAL_OP, LOCAL0_OP, BYTE_PREFIX, 3, CONTINUE_OP]),
        &pkg(&[IF_OP], &[LEQUAL_OP, LOCAL0_OP, BYTE_PREFIX, 6, BREAK_OP]),
        &[ADD_OP, LOCAL1_OP, LOCAL0_OP, LOCAL1_OP],
    ]
    .concat();
    let body = [
        &[STORE_OP, ZERO_OP, LOCAL0_OP, STORE_OP, ZERO_OP, LOCAL1_OP][..],
        &pkg(&[WHILE_OP], &loop_body),
        &[RETURN_OP, LOCAL1_OP],
    ]
    .concat();
    let interp = load(&method(b"MAIN", 0, &body));
    assert_eq!(interp.evaluate("\\MAIN", &[]).unwrap(), Object::Integer(1 + 2 + 4 + 5));
}

const LOCAL1_OP: u8 = LOCAL0_OP + 1;

#[test]
fn if_else_picks_a_branch() {
    let body = [
        pkg(&[IF_OP], &[LEQUAL_OP, ARG0_OP, ONE_OP, RETURN_OP, BYTE_PREFIX, 10]),
        pkg(&[ELSE_OP], &[RETURN_OP, BYTE_PREFIX, 20]),
    ]
    .concat();
    let interp = load(&method(b"MAIN", 1, &body));
    assert_eq!(interp.evaluate("\\MAIN", &[Object::Integer(1)]).unwrap(), Object::Integer(10));
    assert_eq!(interp.evaluate("\\MAIN", &[Object::Integer(2)]).unwrap(), Object::Integer(20));
}

#[test]
fn store_converts_to_the_target_type() {
    let mut aml = vec![NAME_OP];
    aml.extend_from_slice(b"STR_");
    aml.extend_from_slice(&[STRING_PREFIX, b'a', b'b', b'c', 0]);
    let mut body = vec![STORE_OP, BYTE_PREFIX, 10];
    body.extend_from_slice(b"STR_");
    body.push(RETURN_OP);
    body.extend_from_slice(b"STR_");
    aml.extend(method(b"MAIN", 0, &body));

    let interp = load(&aml);
    assert_eq!(interp.evaluate("\\MAIN", &[]).unwrap(), Object::string("10"));
}

#[test]
fn hex_integer_format_pads_to_width() {
    let config = InterpreterConfig {
        integer_format: IntegerFormat::Hex,
        ..InterpreterConfig::default()
    };
    let body = [RETURN_OP, CONCAT_OP, BYTE_PREFIX, 10, STRING_PREFIX, b'x', 0, ZERO_OP];
    let interp = load_with(Memory::default(), config, 2, &method(b"MAIN", 0, &body));
    assert_eq!(
        interp.evaluate("\\MAIN", &[]).unwrap(),
        Object::string("000000000000000Ax")
    );
}

#[test]
fn concat_integer_then_string_yields_string() {
    let body = [RETURN_OP, CONCAT_OP, BYTE_PREFIX, 5, STRING_PREFIX, b'x', 0, ZERO_OP];
    let interp = load(&method(b"MAIN", 0, &body));
    assert_eq!(interp.evaluate("\\MAIN", &[]).unwrap(), Object::string("5x"));
}

#[test]
fn divide_stores_remainder_and_quotient() {
    let body = [
        DIVIDE_OP, BYTE_PREFIX, 17, BYTE_PREFIX, 5, LOCAL1_OP, LOCAL0_OP,
        RETURN_OP, ADD_OP, MULTIPLY_OP, LOCAL0_OP, BYTE_PREFIX, 100, ZERO_OP, LOCAL1_OP, ZERO_OP,
    ];
    let interp = load(&method(b"MAIN", 0, &body));
    assert_eq!(interp.evaluate("\\MAIN", &[]).unwrap(), Object::Integer(302));
}

#[test]
fn divide_by_zero_faults() {
    let body = [DIVIDE_OP, ONE_OP, ZERO_OP, ZERO_OP, ZERO_OP];
    let interp = load(&method(b"MAIN", 0, &body));
    assert!(matches!(interp.evaluate("\\MAIN", &[]), Err(AmlError::DivideByZero)));
}

#[test]
fn revision_one_tables_use_32_bit_integers() {
    let body = [
        RETURN_OP, ADD_OP, DWORD_PREFIX, 0xFF, 0xFF, 0xFF, 0xFF, ONE_OP, ZERO_OP,
    ];
    let interp = load_with(
        Memory::default(),
        InterpreterConfig::default(),
        1,
        &method(b"MAIN", 0, &body),
    );
    assert_eq!(interp.evaluate("\\MAIN", &[]).unwrap(), Object::Integer(0));

    let ones = method(b"ONES", 0, &[RETURN_OP, ONES_OP]);
    interp.load_table(&table(1, &ones)).unwrap();
    assert_eq!(interp.evaluate("\\ONES", &[]).unwrap(), Object::Integer(0xFFFF_FFFF));
}

#[test]
fn method_scoped_names_disappear_on_return() {
    let mut body = vec![NAME_OP];
    body.extend_from_slice(b"TMP_");
    body.push(ONE_OP);
    body.push(RETURN_OP);
    body.extend_from_slice(b"TMP_");
    let interp = load(&method(b"MAIN", 0, &body));

    let before = interp.namespace().len();
    assert_eq!(interp.evaluate("\\MAIN", &[]).unwrap(), Object::Integer(1));
    assert_eq!(interp.namespace().len(), before);
    assert!(matches!(interp.resolve("\\MAIN.TMP_"), Err(AmlError::NameNotFound(_))));
}

#[test]
fn runaway_recursion_is_bounded() {
    let mut body = vec![RETURN_OP];
    body.extend_from_slice(b"RECU");
    let config = InterpreterConfig {
        max_call_depth: 8,
        ..InterpreterConfig::default()
    };
    let interp = load_with(Memory::default(), config, 2, &method(b"RECU", 0, &body));
    assert!(matches!(interp.evaluate("\\RECU", &[]), Err(AmlError::StackExhausted(8))));
}

#[test]
fn too_many_arguments_is_rejected() {
    let interp = load(&method(b"MAIN", 1, &[RETURN_OP, ARG0_OP]));
    let err = interp
        .evaluate("\\MAIN", &[Object::Integer(1), Object::Integer(2)])
        .unwrap_err();
    assert!(matches!(
        err,
        AmlError::ArgumentCountMismatch {
            expected: 1,
            given: 2
        }
    ));
}

#[test]
fn reading_a_missing_argument_faults() {
    let interp = load(&method(b"MAIN", 1, &[RETURN_OP, ARG0_OP]));
    assert!(matches!(
        interp.evaluate("\\MAIN", &[]),
        Err(AmlError::UninitializedArgument(0))
    ));
}

#[test]
fn duplicate_names_in_a_table_keep_the_first() {
    let mut aml = Vec::new();
    for value in [1, 2] {
        aml.push(NAME_OP);
        aml.extend_from_slice(b"FOO_");
        aml.extend_from_slice(&[BYTE_PREFIX, value]);
    }
    let interp = load(&aml);
    assert_eq!(interp.evaluate("\\FOO_", &[]).unwrap(), Object::Integer(1));
}

#[test]
fn index_references_write_through_to_the_package() {
    let mut aml = vec![NAME_OP];
    aml.extend_from_slice(b"PKG_");
    aml.extend(pkg(&[PACKAGE_OP], &[3, ONE_OP, BYTE_PREFIX, 2, BYTE_PREFIX, 3]));

    let mut body = vec![STORE_OP, BYTE_PREFIX, 42, INDEX_OP];
    body.extend_from_slice(b"PKG_");
    body.extend_from_slice(&[ONE_OP, ZERO_OP, RETURN_OP, DEREF_OF_OP, INDEX_OP]);
    body.extend_from_slice(b"PKG_");
    body.extend_from_slice(&[ONE_OP, ZERO_OP]);
    aml.extend(method(b"MAIN", 0, &body));

    let interp = load(&aml);
    assert_eq!(interp.evaluate("\\MAIN", &[]).unwrap(), Object::Integer(42));
    assert_eq!(
        interp.evaluate("\\PKG_", &[]).unwrap(),
        Object::package(vec![
            Object::Integer(1),
            Object::Integer(42),
            Object::Integer(3)
        ])
    );
}

#[test]
fn index_past_the_end_faults() {
    let mut aml = vec![NAME_OP];
    aml.extend_from_slice(b"PKG_");
    aml.extend(pkg(&[PACKAGE_OP], &[1, ONE_OP]));
    let mut body = vec![RETURN_OP, INDEX_OP];
    body.extend_from_slice(b"PKG_");
    body.extend_from_slice(&[BYTE_PREFIX, 5, ZERO_OP]);
    aml.extend(method(b"MAIN", 0, &body));

    let interp = load(&aml);
    assert!(matches!(
        interp.evaluate("\\MAIN", &[]),
        Err(AmlError::IndexOutOfBounds { index: 5, length: 1 })
    ));
}

#[test]
fn buffer_fields_write_into_their_buffer() {
    let mut aml = vec![NAME_OP];
    aml.extend_from_slice(b"BUF_");
    aml.extend(pkg(&[BUFFER_OP], &[BYTE_PREFIX, 4]));

    let mut body = vec![CREATE_WORD_FIELD_OP];
    body.extend_from_slice(b"BUF_");
    body.push(ONE_OP);
    body.extend_from_slice(b"WRD_");
    body.extend_from_slice(&[STORE_OP, WORD_PREFIX, 0x34, 0x12]);
    body.extend_from_slice(b"WRD_");
    body.push(RETURN_OP);
    body.extend_from_slice(b"BUF_");
    aml.extend(method(b"MAIN", 0, &body));

    let interp = load(&aml);
    assert_eq!(
        interp.evaluate("\\MAIN", &[]).unwrap(),
        Object::buffer(vec![0, 0x34, 0x12, 0])
    );
}

#[test]
fn system_memory_fields_reach_the_handler() {
    let mut aml = vec![EXT_OP_PREFIX, OP_REGION_OP];
    aml.extend_from_slice(b"REG_");
    aml.extend_from_slice(&[0x00, WORD_PREFIX, 0x00, 0x10, BYTE_PREFIX, 4]);
    let mut fields = b"REG_".to_vec();
    fields.push(0x01);
    fields.extend_from_slice(b"FLD0");
    fields.push(8);
    fields.extend_from_slice(b"FLD1");
    fields.push(8);
    aml.extend(pkg(&[EXT_OP_PREFIX, FIELD_OP], &fields));

    let mut body = vec![STORE_OP, BYTE_PREFIX, 0xAB];
    body.extend_from_slice(b"FLD1");
    body.push(RETURN_OP);
    body.extend_from_slice(b"FLD0");
    aml.extend(method(b"MAIN", 0, &body));

    let interp = load_with(
        Memory::with(&[(0x1000, 0x11)]),
        InterpreterConfig::default(),
        2,
        &aml,
    );
    assert_eq!(interp.evaluate("\\MAIN", &[]).unwrap(), Object::Integer(0x11));
    assert_eq!(interp.handler().byte(0x1001), 0xAB);
    assert_eq!(interp.read_field("\\FLD1").unwrap(), Object::Integer(0xAB));
}

#[test]
fn mutex_order_violation_releases_what_was_held() {
    let mut aml = Vec::new();
    for (name, level) in [(b"MTXA", 5), (b"MTXB", 3)] {
        aml.extend_from_slice(&[EXT_OP_PREFIX, MUTEX_OP]);
        aml.extend_from_slice(name);
        aml.push(level);
    }
    let mut body = Vec::new();
    for name in [b"MTXA", b"MTXB"] {
        body.extend_from_slice(&[EXT_OP_PREFIX, ACQUIRE_OP]);
        body.extend_from_slice(name);
        body.extend_from_slice(&[0xFF, 0xFF]);
    }
    aml.extend(method(b"MAIN", 0, &body));

    let interp = load(&aml);
    assert!(matches!(
        interp.evaluate("\\MAIN", &[]),
        Err(AmlError::MutexOrderViolation {
            held: 5,
            requested: 3
        })
    ));
    let Object::Mutex(a) = interp.evaluate("\\MTXA", &[]).unwrap() else {
        panic!("MTXA is not a mutex");
    };
    assert_eq!(a.owner(), None);
}

#[test]
fn releasing_an_unowned_mutex_faults() {
    let mut aml = vec![EXT_OP_PREFIX, MUTEX_OP];
    aml.extend_from_slice(b"MTXA");
    aml.push(0);
    let mut body = vec![EXT_OP_PREFIX, RELEASE_OP];
    body.extend_from_slice(b"MTXA");
    aml.extend(method(b"MAIN", 0, &body));

    let interp = load(&aml);
    assert!(matches!(interp.evaluate("\\MAIN", &[]), Err(AmlError::MutexNotOwned)));
}

#[test]
fn notify_reaches_the_handler() {
    let mut aml = pkg(
        &[EXT_OP_PREFIX, DEVICE_OP],
        &[&[ROOT_PREFIX, DUAL_NAME_PREFIX][..], b"_SB_", b"DEV0"].concat(),
    );
    let mut body = vec![NOTIFY_OP, ROOT_PREFIX, DUAL_NAME_PREFIX];
    body.extend_from_slice(b"_SB_DEV0");
    body.extend_from_slice(&[BYTE_PREFIX, 0x80]);
    aml.extend(method(b"MAIN", 0, &body));

    let interp = load(&aml);
    interp.evaluate("\\MAIN", &[]).unwrap();
    assert_eq!(
        *interp.handler().notified.lock(),
        vec![(String::from("\\_SB_.DEV0"), 0x80)]
    );
}

#[test]
fn osi_answers_configured_interfaces() {
    let mut body = vec![RETURN_OP];
    body.extend_from_slice(b"_OSI");
    body.push(STRING_PREFIX);
    body.extend_from_slice(b"Windows 2015\0");
    let interp = load(&method(b"MAIN", 0, &body));

    assert_eq!(interp.evaluate("\\MAIN", &[]).unwrap(), Object::Integer(u64::MAX));
    assert_eq!(
        interp.evaluate("\\_OSI", &[Object::string("Linux")]).unwrap(),
        Object::Integer(0)
    );
}

#[test]
fn fatal_faults_the_method() {
    let body = [
        EXT_OP_PREFIX, FATAL_OP, 0x02, 0x78, 0x56, 0x34, 0x12, BYTE_PREFIX, 0x09,
    ];
    let interp = load(&method(b"MAIN", 0, &body));
    assert!(matches!(
        interp.evaluate("\\MAIN", &[]),
        Err(AmlError::MethodFault {
            fatal_type: 2,
            code: 0x1234_5678,
            arg: 9
        })
    ));
}

#[test]
fn unknown_opcode_aborts_the_table_but_keeps_earlier_nodes() {
    let mut aml = vec![NAME_OP];
    aml.extend_from_slice(b"AAAA");
    aml.push(ONE_OP);
    aml.extend_from_slice(&[EXT_OP_PREFIX, 0x7F]);

    let interp = Interpreter::new(Memory::default(), InterpreterConfig::default());
    let err = interp.load_table(&table(2, &aml)).unwrap_err();
    assert!(matches!(
        err,
        AmlError::Parse {
            kind: ParseErrorKind::UnknownOpcode(0x5B7F),
            ..
        }
    ));
    assert_eq!(interp.evaluate("\\AAAA", &[]).unwrap(), Object::Integer(1));
}

#[test]
fn mid_and_to_string() {
    // Mid("Hadron", 1, 3) then ToString(Buffer{'a','b',0,'c'}, Ones)
    let mut body = vec![STORE_OP, MID_OP, STRING_PREFIX];
    body.extend_from_slice(b"Hadron\0");
    body.extend_from_slice(&[ONE_OP, BYTE_PREFIX, 3, ZERO_OP, LOCAL0_OP]);
    body.extend_from_slice(&[STORE_OP, TO_STRING_OP]);
    body.extend(pkg(&[BUFFER_OP], &[BYTE_PREFIX, 4, b'a', b'b', 0, b'c']));
    body.extend_from_slice(&[ONES_OP, ZERO_OP, LOCAL1_OP]);
    body.extend_from_slice(&[RETURN_OP, CONCAT_OP, LOCAL0_OP, LOCAL1_OP, ZERO_OP]);
    let interp = load(&method(b"MAIN", 0, &body));
    assert_eq!(interp.evaluate("\\MAIN", &[]).unwrap(), Object::string("adrab"));
}

#[test]
fn object_type_does_not_invoke_methods() {
    let mut aml = method(b"NOPE", 0, &[EXT_OP_PREFIX, FATAL_OP, 0, 0, 0, 0, 0, ZERO_OP]);
    let mut body = vec![RETURN_OP, OBJECT_TYPE_OP];
    body.extend_from_slice(b"NOPE");
    aml.extend(method(b"MAIN", 0, &body));
    let interp = load(&aml);
    assert_eq!(
        interp.evaluate("\\MAIN", &[]).unwrap(),
        Object::Integer(ObjectType::Method.code())
    );
}
