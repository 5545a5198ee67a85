//! Field units over operation regions: bit packing, access widths, update
//! rules, index fields and PCI configuration space.

mod common;

use common::*;
use hadron_aml::aml::opcode::*;
use hadron_aml::{
    AccessWidth, AmlError, Interpreter, InterpreterConfig, Object, RegionError, RegionSpace,
};
use pretty_assertions::assert_eq;

const MEM: RegionSpace = RegionSpace::SystemMemory;

#[test_log::test]
fn fields_pack_across_byte_boundaries() {
    let body = [
        op_region(b"GPIO", space::SYSTEM_MEMORY, 0x1000, 4),
        field(
            b"GPIO",
            flags::BYTE,
            &[
                reserved(3),
                field_unit(b"FLGA", 5),
                field_unit(b"FLGB", 4),
                field_unit(b"FLGC", 12),
            ],
        ),
    ]
    .concat();
    let aml = load(&body);
    aml.handler().poke(MEM, 0x1000, &[0b1010_1111, 0x5A, 0xC3, 0x00]);

    assert_eq!(aml.read_field("\\FLGA").unwrap(), Object::Integer(0b10101));
    assert_eq!(aml.read_field("\\FLGB").unwrap(), Object::Integer(0xA));
    assert_eq!(aml.read_field("\\FLGC").unwrap(), Object::Integer(0xC35));
    assert!(
        aml.handler()
            .accesses()
            .iter()
            .all(|a| a.width == AccessWidth::Byte)
    );

    aml.write_field("\\FLGB", Object::Integer(0x3)).unwrap();
    assert_eq!(aml.handler().peek(MEM, 0x1001, 1), vec![0x53]);
    let last = *aml.handler().accesses().last().unwrap();
    assert_eq!(
        last,
        Access {
            space: MEM,
            address: 0x1001,
            width: AccessWidth::Byte,
            written: Some(0x53),
        }
    );
}

#[test]
fn update_rules_fill_the_rest_of_the_unit() {
    let body = [
        op_region(b"REG_", space::SYSTEM_MEMORY, 0x2000, 2),
        field(b"REG_", flags::BYTE | flags::WRITE_AS_ONES, &[reserved(4), field_unit(b"ONES", 4)]),
        field(b"REG_", flags::BYTE | flags::WRITE_AS_ZEROS, &[reserved(12), field_unit(b"ZERO", 4)]),
    ]
    .concat();
    let aml = load(&body);
    aml.handler().poke(MEM, 0x2000, &[0x5A, 0x5A]);

    aml.write_field("\\ONES", Object::Integer(0)).unwrap();
    aml.write_field("\\ZERO", Object::Integer(0xF)).unwrap();

    assert_eq!(aml.handler().peek(MEM, 0x2000, 2), vec![0x0F, 0xF0]);
    // Neither rule needs to read the unit first.
    assert!(aml.handler().accesses().iter().all(|a| a.written.is_some()));
}

#[test]
fn wide_fields_read_as_buffers() {
    let body = [
        op_region(b"BIG_", space::SYSTEM_MEMORY, 0x3000, 16),
        field(b"BIG_", flags::BYTE, &[field_unit(b"WIDE", 72)]),
    ]
    .concat();
    let aml = load(&body);
    let bytes: Vec<u8> = (1..=9).collect();
    aml.handler().poke(MEM, 0x3000, &bytes);

    assert_eq!(aml.read_field("\\WIDE").unwrap(), Object::buffer(bytes));
}

#[test]
fn word_access_uses_aligned_units() {
    let body = [
        op_region(b"IO__", space::SYSTEM_IO, 0x60, 4),
        field(b"IO__", flags::WORD, &[reserved(20), field_unit(b"BITS", 8)]),
    ]
    .concat();
    let aml = load(&body);
    aml.handler().poke(RegionSpace::SystemIo, 0x62, &[0x30, 0x12]);

    // Bits 20..28 straddle the nibbles of bytes 0x62 and 0x63.
    assert_eq!(aml.read_field("\\BITS").unwrap(), Object::Integer(0x23));
    assert_eq!(
        aml.handler().accesses(),
        vec![Access {
            space: RegionSpace::SystemIo,
            address: 0x62,
            width: AccessWidth::Word,
            written: None,
        }]
    );
}

#[test]
fn index_fields_go_through_the_index_register() {
    let body = [
        op_region(b"IDXR", space::SYSTEM_IO, 0x70, 2),
        field(b"IDXR", flags::BYTE, &[field_unit(b"INDX", 8), field_unit(b"DATA", 8)]),
        index_field(b"INDX", b"DATA", flags::BYTE, &[reserved(16), field_unit(b"REGB", 8)]),
    ]
    .concat();
    let aml = load(&body);

    aml.write_field("\\REGB", Object::Integer(0x42)).unwrap();
    let writes: Vec<(u64, Option<u64>)> = aml
        .handler()
        .accesses()
        .iter()
        .map(|a| (a.address, a.written))
        .collect();
    assert_eq!(writes, vec![(0x70, Some(2)), (0x71, Some(0x42))]);
}

#[test]
fn pci_config_regions_address_their_device() {
    // Device (PCI0) { Name (_BBN, 2) Device (LPC_) { Name (_ADR, 0x001F0003) ... } }
    let lpc = [
        name(b"_ADR", &int(0x001F_0003)),
        op_region(b"CFG_", space::PCI_CONFIG, 0x40, 0x10),
        field(b"CFG_", flags::DWORD, &[field_unit(b"VEND", 32)]),
    ]
    .concat();
    let body = device(b"PCI0", &[name(b"_BBN", &int(2)), device(b"LPC_", &lpc)].concat());
    let aml = load(&body);

    let key = 2 << 20 | 0x1F << 15 | 3 << 12 | 0x40;
    aml.handler().poke(RegionSpace::PciConfig, key, &[0x86, 0x80, 0x11, 0x22]);
    assert_eq!(
        aml.read_field("\\PCI0.LPC_.VEND").unwrap(),
        Object::Integer(0x2211_8086)
    );
}

#[test]
fn fields_past_the_region_fault_on_access() {
    let body = [
        op_region(b"TINY", space::SYSTEM_MEMORY, 0x4000, 1),
        field(b"TINY", flags::BYTE, &[field_unit(b"OVER", 16)]),
    ]
    .concat();
    let aml = load(&body);
    assert!(matches!(
        aml.read_field("\\OVER"),
        Err(AmlError::RegionAccess(RegionError::OutOfBounds { .. }))
    ));
}

#[test]
fn unsupported_spaces_surface_as_region_faults() {
    let body = [
        op_region(b"OEM_", 0x80, 0, 4),
        field(b"OEM_", flags::BYTE, &[field_unit(b"OEMF", 8)]),
        method(b"READ", 0, &ret(b"OEMF")),
    ]
    .concat();
    let aml = load(&body);
    assert_eq!(
        aml.evaluate("\\READ", &[]),
        Err(AmlError::RegionAccess(RegionError::UnsupportedSpace(
            RegionSpace::Other(0x80)
        )))
    );
}

#[test]
fn methods_store_into_fields() {
    // Method (SETF, 1) { Store (Arg0, FLD_) }
    let body = [
        op_region(b"REG_", space::SYSTEM_MEMORY, 0x5000, 4),
        field(b"REG_", flags::ANY, &[field_unit(b"FLD_", 16)]),
        method(b"SETF", 1, &store(&[ARG0_OP], b"FLD_")),
    ]
    .concat();
    let aml = load(&body);
    aml.evaluate("\\SETF", &[Object::Integer(0xBEEF)]).unwrap();
    assert_eq!(aml.handler().peek(MEM, 0x5000, 2), vec![0xEF, 0xBE]);
}

#[test]
fn region_addresses_that_wrap_fault() {
    let body = [
        op_region(b"HIGH", space::SYSTEM_MEMORY, u64::MAX, 0x10),
        field(b"HIGH", flags::BYTE, &[reserved(8), field_unit(b"PAST", 8)]),
        op_region(b"CFG_", space::PCI_CONFIG, 0xFFF0, 0x30),
        field(b"CFG_", flags::BYTE, &[reserved(0x100), field_unit(b"REG_", 8)]),
    ]
    .concat();
    let aml = load(&body);

    assert_eq!(
        aml.read_field("\\PAST"),
        Err(AmlError::RegionAccess(RegionError::AddressOverflow {
            space: MEM,
            base: u64::MAX,
            byte_offset: 1,
        }))
    );
    assert!(matches!(
        aml.write_field("\\REG_", Object::Integer(1)),
        Err(AmlError::RegionAccess(RegionError::AddressOverflow { .. }))
    ));
    assert!(aml.handler().accesses().is_empty());
}

#[test]
fn adr_reading_its_own_region_is_a_cycle() {
    // Device (PCI0) {
    //     OperationRegion (PCFG, PCI_Config, 0, 0x10)
    //     Field (PCFG, ByteAcc) { VID0, 8 }
    //     Method (_ADR) { Return (VID0) }
    // }
    let body = device(
        b"PCI0",
        &[
            op_region(b"PCFG", space::PCI_CONFIG, 0, 0x10),
            field(b"PCFG", flags::BYTE, &[field_unit(b"VID0", 8)]),
            method(b"_ADR", 0, &ret(b"VID0")),
        ]
        .concat(),
    );
    let aml = load(&body);

    assert_eq!(
        aml.read_field("\\PCI0.VID0"),
        Err(AmlError::RegionAccess(RegionError::PciAddressCycle))
    );
    // A failed resolution leaves nothing behind.
    assert_eq!(
        aml.read_field("\\PCI0.VID0"),
        Err(AmlError::RegionAccess(RegionError::PciAddressCycle))
    );
}

#[test]
fn revision_one_tables_read_wide_fields_as_buffers() {
    let body = [
        op_region(b"QREG", space::SYSTEM_MEMORY, 0x6000, 8),
        field(b"QREG", flags::ANY, &[field_unit(b"QWRD", 64)]),
        method(b"READ", 0, &ret(b"QWRD")),
    ]
    .concat();
    let aml = Interpreter::new(TestHandler::default(), InterpreterConfig::default());
    aml.load_table(&table(b"DSDT", 1, &body)).unwrap();
    let bytes: Vec<u8> = (1..=8).collect();
    aml.handler().poke(MEM, 0x6000, &bytes);

    assert_eq!(aml.read_field("\\QWRD").unwrap(), Object::buffer(bytes.clone()));
    assert_eq!(aml.evaluate("\\READ", &[]).unwrap(), Object::buffer(bytes));

    // Two DWords, not one 64-bit integer.
    aml.write_field("\\QWRD", Object::Integer(0x1122_3344_5566_7788)).unwrap();
    assert_eq!(aml.handler().peek(MEM, 0x6000, 8), vec![0x88, 0x77, 0x66, 0x55, 0, 0, 0, 0]);
}
