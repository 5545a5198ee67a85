//! AML opcode constants and the operator tag set.
//!
//! Byte values follow ACPI 6.5 §20.3. Extended opcodes are encoded as
//! [`EXT_OP_PREFIX`] followed by the second byte listed here.

#![allow(missing_docs)]

// Data objects
pub const ZERO_OP: u8 = 0x00;
pub const ONE_OP: u8 = 0x01;
pub const ALIAS_OP: u8 = 0x06;
pub const NAME_OP: u8 = 0x08;
pub const BYTE_PREFIX: u8 = 0x0A;
pub const WORD_PREFIX: u8 = 0x0B;
pub const DWORD_PREFIX: u8 = 0x0C;
pub const STRING_PREFIX: u8 = 0x0D;
pub const QWORD_PREFIX: u8 = 0x0E;
pub const SCOPE_OP: u8 = 0x10;
pub const BUFFER_OP: u8 = 0x11;
pub const PACKAGE_OP: u8 = 0x12;
pub const VAR_PACKAGE_OP: u8 = 0x13;
pub const METHOD_OP: u8 = 0x14;
pub const EXTERNAL_OP: u8 = 0x15;
pub const ONES_OP: u8 = 0xFF;

// Name prefixes
pub const DUAL_NAME_PREFIX: u8 = 0x2E;
pub const MULTI_NAME_PREFIX: u8 = 0x2F;
pub const ROOT_PREFIX: u8 = 0x5C;
pub const PARENT_PREFIX: u8 = 0x5E;
pub const NULL_NAME: u8 = 0x00;

// Extended opcodes (second byte after EXT_OP_PREFIX)
pub const EXT_OP_PREFIX: u8 = 0x5B;
pub const MUTEX_OP: u8 = 0x01;
pub const EVENT_OP: u8 = 0x02;
pub const COND_REF_OF_OP: u8 = 0x12;
pub const CREATE_FIELD_OP: u8 = 0x13;
pub const LOAD_TABLE_OP: u8 = 0x1F;
pub const LOAD_OP: u8 = 0x20;
pub const STALL_OP: u8 = 0x21;
pub const SLEEP_OP: u8 = 0x22;
pub const ACQUIRE_OP: u8 = 0x23;
pub const SIGNAL_OP: u8 = 0x24;
pub const WAIT_OP: u8 = 0x25;
pub const RESET_OP: u8 = 0x26;
pub const RELEASE_OP: u8 = 0x27;
pub const FROM_BCD_OP: u8 = 0x28;
pub const TO_BCD_OP: u8 = 0x29;
pub const UNLOAD_OP: u8 = 0x2A;
pub const REVISION_OP: u8 = 0x30;
pub const DEBUG_OP: u8 = 0x31;
pub const FATAL_OP: u8 = 0x32;
pub const TIMER_OP: u8 = 0x33;
pub const OP_REGION_OP: u8 = 0x80;
pub const FIELD_OP: u8 = 0x81;
pub const DEVICE_OP: u8 = 0x82;
pub const PROCESSOR_OP: u8 = 0x83;
pub const POWER_RES_OP: u8 = 0x84;
pub const THERMAL_ZONE_OP: u8 = 0x85;
pub const INDEX_FIELD_OP: u8 = 0x86;
pub const BANK_FIELD_OP: u8 = 0x87;
pub const DATA_REGION_OP: u8 = 0x88;

// Local and argument references
pub const LOCAL0_OP: u8 = 0x60;
pub const LOCAL7_OP: u8 = 0x67;
pub const ARG0_OP: u8 = 0x68;
pub const ARG6_OP: u8 = 0x6E;

// Expression opcodes
pub const STORE_OP: u8 = 0x70;
pub const REF_OF_OP: u8 = 0x71;
pub const ADD_OP: u8 = 0x72;
pub const CONCAT_OP: u8 = 0x73;
pub const SUBTRACT_OP: u8 = 0x74;
pub const INCREMENT_OP: u8 = 0x75;
pub const DECREMENT_OP: u8 = 0x76;
pub const MULTIPLY_OP: u8 = 0x77;
pub const DIVIDE_OP: u8 = 0x78;
pub const SHIFT_LEFT_OP: u8 = 0x79;
pub const SHIFT_RIGHT_OP: u8 = 0x7A;
pub const AND_OP: u8 = 0x7B;
pub const NAND_OP: u8 = 0x7C;
pub const OR_OP: u8 = 0x7D;
pub const NOR_OP: u8 = 0x7E;
pub const XOR_OP: u8 = 0x7F;
pub const NOT_OP: u8 = 0x80;
pub const FIND_SET_LEFT_BIT_OP: u8 = 0x81;
pub const FIND_SET_RIGHT_BIT_OP: u8 = 0x82;
pub const DEREF_OF_OP: u8 = 0x83;
pub const CONCAT_RES_OP: u8 = 0x84;
pub const MOD_OP: u8 = 0x85;
pub const NOTIFY_OP: u8 = 0x86;
pub const SIZE_OF_OP: u8 = 0x87;
pub const INDEX_OP: u8 = 0x88;
pub const MATCH_OP: u8 = 0x89;
pub const CREATE_DWORD_FIELD_OP: u8 = 0x8A;
pub const CREATE_WORD_FIELD_OP: u8 = 0x8B;
pub const CREATE_BYTE_FIELD_OP: u8 = 0x8C;
pub const CREATE_BIT_FIELD_OP: u8 = 0x8D;
pub const OBJECT_TYPE_OP: u8 = 0x8E;
pub const CREATE_QWORD_FIELD_OP: u8 = 0x8F;
pub const LAND_OP: u8 = 0x90;
pub const LOR_OP: u8 = 0x91;
pub const LNOT_OP: u8 = 0x92;
pub const LEQUAL_OP: u8 = 0x93;
pub const LGREATER_OP: u8 = 0x94;
pub const LLESS_OP: u8 = 0x95;
pub const TO_BUFFER_OP: u8 = 0x96;
pub const TO_DECIMAL_STRING_OP: u8 = 0x97;
pub const TO_HEX_STRING_OP: u8 = 0x98;
pub const TO_INTEGER_OP: u8 = 0x99;
pub const TO_STRING_OP: u8 = 0x9C;
pub const COPY_OBJECT_OP: u8 = 0x9D;
pub const MID_OP: u8 = 0x9E;

// Control flow
pub const CONTINUE_OP: u8 = 0x9F;
pub const IF_OP: u8 = 0xA0;
pub const ELSE_OP: u8 = 0xA1;
pub const WHILE_OP: u8 = 0xA2;
pub const NOOP_OP: u8 = 0xA3;
pub const RETURN_OP: u8 = 0xA4;
pub const BREAK_OP: u8 = 0xA5;
pub const BREAK_POINT_OP: u8 = 0xCC;

// Field list element prefixes
pub const RESERVED_FIELD: u8 = 0x00;
pub const ACCESS_FIELD: u8 = 0x01;
pub const CONNECT_FIELD: u8 = 0x02;
pub const EXTENDED_ACCESS_FIELD: u8 = 0x03;

/// Operators whose operands are all further terms (TermArg, SuperName,
/// Target) or fixed-size immediates read by the executor.
///
/// Namespace-defining and block-structured opcodes carry decoded header
/// fields and are separate [`Term`](super::decoder::Term) variants instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Store,
    RefOf,
    Add,
    Concat,
    Subtract,
    Increment,
    Decrement,
    Multiply,
    Divide,
    ShiftLeft,
    ShiftRight,
    And,
    Nand,
    Or,
    Nor,
    Xor,
    Not,
    FindSetLeftBit,
    FindSetRightBit,
    DerefOf,
    ConcatRes,
    Mod,
    Notify,
    SizeOf,
    Index,
    Match,
    CreateDWordField,
    CreateWordField,
    CreateByteField,
    CreateBitField,
    ObjectType,
    CreateQWordField,
    LAnd,
    LOr,
    LNot,
    LEqual,
    LGreater,
    LLess,
    ToBuffer,
    ToDecimalString,
    ToHexString,
    ToInteger,
    ToString,
    CopyObject,
    Mid,
    CondRefOf,
    CreateField,
    LoadTable,
    Load,
    Stall,
    Sleep,
    Acquire,
    Signal,
    Wait,
    Reset,
    Release,
    FromBcd,
    ToBcd,
    Unload,
    Timer,
}

impl Opcode {
    /// Maps a single-byte opcode to its operator, if it is one.
    #[must_use]
    pub fn from_base(op: u8) -> Option<Self> {
        Some(match op {
            STORE_OP => Self::Store,
            REF_OF_OP => Self::RefOf,
            ADD_OP => Self::Add,
            CONCAT_OP => Self::Concat,
            SUBTRACT_OP => Self::Subtract,
            INCREMENT_OP => Self::Increment,
            DECREMENT_OP => Self::Decrement,
            MULTIPLY_OP => Self::Multiply,
            DIVIDE_OP => Self::Divide,
            SHIFT_LEFT_OP => Self::ShiftLeft,
            SHIFT_RIGHT_OP => Self::ShiftRight,
            AND_OP => Self::And,
            NAND_OP => Self::Nand,
            OR_OP => Self::Or,
            NOR_OP => Self::Nor,
            XOR_OP => Self::Xor,
            NOT_OP => Self::Not,
            FIND_SET_LEFT_BIT_OP => Self::FindSetLeftBit,
            FIND_SET_RIGHT_BIT_OP => Self::FindSetRightBit,
            DEREF_OF_OP => Self::DerefOf,
            CONCAT_RES_OP => Self::ConcatRes,
            MOD_OP => Self::Mod,
            NOTIFY_OP => Self::Notify,
            SIZE_OF_OP => Self::SizeOf,
            INDEX_OP => Self::Index,
            MATCH_OP => Self::Match,
            CREATE_DWORD_FIELD_OP => Self::CreateDWordField,
            CREATE_WORD_FIELD_OP => Self::CreateWordField,
            CREATE_BYTE_FIELD_OP => Self::CreateByteField,
            CREATE_BIT_FIELD_OP => Self::CreateBitField,
            OBJECT_TYPE_OP => Self::ObjectType,
            CREATE_QWORD_FIELD_OP => Self::CreateQWordField,
            LAND_OP => Self::LAnd,
            LOR_OP => Self::LOr,
            LNOT_OP => Self::LNot,
            LEQUAL_OP => Self::LEqual,
            LGREATER_OP => Self::LGreater,
            LLESS_OP => Self::LLess,
            TO_BUFFER_OP => Self::ToBuffer,
            TO_DECIMAL_STRING_OP => Self::ToDecimalString,
            TO_HEX_STRING_OP => Self::ToHexString,
            TO_INTEGER_OP => Self::ToInteger,
            TO_STRING_OP => Self::ToString,
            COPY_OBJECT_OP => Self::CopyObject,
            MID_OP => Self::Mid,
            _ => return None,
        })
    }

    /// Maps the second byte of an extended opcode to its operator, if it is
    /// one.
    #[must_use]
    pub fn from_extended(op: u8) -> Option<Self> {
        Some(match op {
            COND_REF_OF_OP => Self::CondRefOf,
            CREATE_FIELD_OP => Self::CreateField,
            LOAD_TABLE_OP => Self::LoadTable,
            LOAD_OP => Self::Load,
            STALL_OP => Self::Stall,
            SLEEP_OP => Self::Sleep,
            ACQUIRE_OP => Self::Acquire,
            SIGNAL_OP => Self::Signal,
            WAIT_OP => Self::Wait,
            RESET_OP => Self::Reset,
            RELEASE_OP => Self::Release,
            FROM_BCD_OP => Self::FromBcd,
            TO_BCD_OP => Self::ToBcd,
            UNLOAD_OP => Self::Unload,
            TIMER_OP => Self::Timer,
            _ => return None,
        })
    }
}
