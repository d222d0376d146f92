use crate::*;

// ============================================================================
//  UVARINT
// ============================================================================

#[test]
fn test_uvarint_single_byte() {
    for v in [0u32, 1, 42, 127] {
        let mut buf = Vec::new();
        put_uvarint(&mut buf, v);
        assert_eq!(buf.len(), 1, "{} should be one byte", v);
        assert_eq!(read_uvarint(&buf).unwrap(), (v, 1));
    }
}

#[test]
fn test_uvarint_boundaries() {
    for v in [128u32, 16_383, 16_384, 2_097_151, 2_097_152, u32::MAX] {
        let mut buf = Vec::new();
        put_uvarint(&mut buf, v);
        let (decoded, consumed) = read_uvarint(&buf).unwrap();
        assert_eq!(decoded, v);
        assert_eq!(consumed, buf.len());
    }
}

#[test]
fn test_uvarint_continuation_bit_layout() {
    // 300 = 0b10_0101100 -> groups [0x02, 0x2C], msb group first.
    let mut buf = Vec::new();
    put_uvarint(&mut buf, 300);
    assert_eq!(buf, vec![0x82, 0x2C]);
}

#[test]
fn test_uvarint_truncated() {
    assert_eq!(read_uvarint(&[0x82]), Err(Error::UnexpectedEnd));
    assert_eq!(read_uvarint(&[]), Err(Error::UnexpectedEnd));
}

#[test]
fn test_uvarint_overflow() {
    // Six continuation bytes never terminate within the accepted width.
    assert_eq!(read_uvarint(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F]), Err(Error::VarintOverflow));
    // Five bytes whose value exceeds u32 must not wrap silently.
    assert_eq!(read_uvarint(&[0x90, 0x80, 0x80, 0x80, 0x00]), Err(Error::VarintOverflow));
}

// ============================================================================
//  NODES
// ============================================================================

#[test]
fn test_node_roundtrip() {
    let mut buf = Vec::new();
    put_node(&mut buf, 0x2E, b"payload");
    let (kind, body, consumed) = read_node(&buf).unwrap();
    assert_eq!(kind, 0x2E);
    assert_eq!(body, b"payload");
    assert_eq!(consumed, buf.len());
}

#[test]
fn test_node_leaves_trailing_bytes() {
    let mut buf = Vec::new();
    put_node(&mut buf, 0x01, b"a");
    let node_len = buf.len();
    buf.extend_from_slice(b"extra");
    let (_, body, consumed) = read_node(&buf).unwrap();
    assert_eq!(body, b"a");
    assert_eq!(consumed, node_len);
}

#[test]
fn test_node_missing_flag() {
    assert_eq!(read_node(&[0x2E, 0x00]), Err(Error::MissingNodeFlag(0x2E)));
}

#[test]
fn test_node_truncated_body() {
    let err = read_node(&[NODE_FLAG | 0x01, 0x05, b'a', b'b']).unwrap_err();
    assert!(matches!(err, Error::LengthOverrun { declared: 5, .. }));
}

// ============================================================================
//  FIELDS
// ============================================================================

#[test]
fn test_field_roundtrip_mixed() {
    let mut w = FieldWriter::new();
    w.str(0x01, "name")
        .u8(0x02, 0x5F)
        .u32(0x03, 0xDEAD_BEEF)
        .u32_list(0x04, &[0x33, 0x34])
        .bytes(0x05, b"");
    let body = w.into_body();

    let mut r = FieldReader::new(&body);
    let (tag, v) = r.next().unwrap().unwrap();
    assert_eq!((tag, value_str(v).unwrap()), (0x01, "name"));
    let (tag, v) = r.next().unwrap().unwrap();
    assert_eq!((tag, value_u8(v).unwrap()), (0x02, 0x5F));
    let (tag, v) = r.next().unwrap().unwrap();
    assert_eq!((tag, value_u32(v).unwrap()), (0x03, 0xDEAD_BEEF));
    let (tag, v) = r.next().unwrap().unwrap();
    assert_eq!((tag, value_u32_list(v).unwrap()), (0x04, vec![0x33, 0x34]));
    let (tag, v) = r.next().unwrap().unwrap();
    assert_eq!((tag, v), (0x05, &b""[..]));
    assert!(r.next().unwrap().is_none());
}

#[test]
fn test_field_reader_skips_unknown_tags() {
    let mut w = FieldWriter::new();
    w.str(0x01, "keep").bytes(0x7F, b"future field").str(0x02, "also keep");
    let body = w.into_body();

    let mut r = FieldReader::new(&body);
    let mut seen = Vec::new();
    while let Some((tag, _)) = r.next().unwrap() {
        seen.push(tag);
    }
    assert_eq!(seen, vec![0x01, 0x7F, 0x02]);
}

#[test]
fn test_field_reader_truncation() {
    let mut w = FieldWriter::new();
    w.str(0x01, "hello");
    let mut body = w.into_body();
    body.truncate(body.len() - 1);

    let mut r = FieldReader::new(&body);
    assert!(matches!(r.next(), Err(Error::LengthOverrun { .. })));
}

#[test]
fn test_value_decoders_reject_wrong_sizes() {
    assert!(matches!(value_u32(&[1, 2, 3]), Err(Error::WrongValueSize { expected: 4, actual: 3 })));
    assert!(matches!(value_u8(&[]), Err(Error::WrongValueSize { expected: 1, actual: 0 })));
    assert!(matches!(value_u32_list(&[0, 0, 0]), Err(Error::WrongValueSize { .. })));
    assert_eq!(value_str(&[0xFF, 0xFE]), Err(Error::InvalidUtf8));
}

#[test]
fn test_le_packing_matches_guest_convention() {
    let mut w = FieldWriter::new();
    w.u32_list(0x04, &[0x33]);
    let body = w.into_body();
    // tag, len 4, then 0x33 little-endian.
    assert_eq!(body, vec![0x04, 0x04, 0x33, 0x00, 0x00, 0x00]);
}
