use dns_wire::message::test_util::*;
use dns_wire::message::Message;

#[test]
fn roundtrip_message() {
    for _ in 0..100 {
        let original = arbitrary_message();
        let serialised = original.to_octets().unwrap();
        assert_eq!(Ok(original), Message::from_octets(&serialised));
    }
}

#[test]
fn roundtrip_message_uncompressed() {
    for _ in 0..100 {
        let original = arbitrary_message();
        let serialised = original.to_uncompressed_octets().unwrap();
        assert_eq!(Ok(original), Message::from_octets(&serialised));
    }
}

#[test]
fn compression_equivalence() {
    // the same message emitted with and without pointers must parse
    // identically
    for _ in 0..100 {
        let original = arbitrary_message();
        let compressed = original.to_octets().unwrap();
        let uncompressed = original.to_uncompressed_octets().unwrap();

        assert!(compressed.len() <= uncompressed.len());
        assert_eq!(
            Message::from_octets(&compressed),
            Message::from_octets(&uncompressed)
        );
    }
}
