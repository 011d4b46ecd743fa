#![no_main]
use libfuzzer_sys::fuzz_target;

use dns_wire::message::Message;

fuzz_target!(|message: Message| {
    let serialised = message.to_octets().unwrap();
    let deserialised = Message::from_octets(&serialised);
    assert_eq!(Ok(message), deserialised);

    let uncompressed = deserialised.unwrap().to_uncompressed_octets().unwrap();
    assert_eq!(Message::from_octets(&serialised), Message::from_octets(&uncompressed));
});
