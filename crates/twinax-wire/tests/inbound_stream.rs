use twinax_wire::{decode_word, encode_word, LineDecoder, WireEvent};

#[test]
fn mixed_stream_preserves_event_order() {
    let mut dec = LineDecoder::new();
    dec.extend(b"[DEBUG] sync acquired\n\x5C\x47\n\x71\x40\x45\x44\n[EOTX]\n");

    let mut events = Vec::new();
    while let Some(ev) = dec.next_event().unwrap() {
        events.push(ev);
    }

    assert_eq!(
        events,
        vec![
            WireEvent::Debug("[DEBUG] sync acquired".to_string()),
            WireEvent::Word { b1: 0x5C, b2: 0x47 },
            WireEvent::Word { b1: 0x71, b2: 0x40 },
            WireEvent::Word { b1: 0x45, b2: 0x44 },
            WireEvent::EndOfTransmission,
        ]
    );
}

#[test]
fn byte_at_a_time_arrival_decodes_identically() {
    let stream = b"\x5C\x47\x71\x40\n[EOTX]\n";

    let mut all_at_once = LineDecoder::new();
    all_at_once.extend(stream);
    let mut expected = Vec::new();
    while let Some(ev) = all_at_once.next_event().unwrap() {
        expected.push(ev);
    }

    let mut dribbled = LineDecoder::new();
    let mut got = Vec::new();
    for &byte in stream {
        dribbled.extend(&[byte]);
        while let Some(ev) = dribbled.next_event().unwrap() {
            got.push(ev);
        }
    }
    assert_eq!(got, expected);
}

#[test]
fn transported_word_space_round_trips() {
    // the pair encoding carries bits [14:4]; everything the host puts on
    // the wire must survive unchanged
    for w in (0u16..0x8000).step_by(16) {
        let [b1, b2] = encode_word(w & 0x7FF0);
        assert_eq!(decode_word(b1, b2), w & 0x7FF0);
    }
}
