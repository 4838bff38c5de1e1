use twinax_keyboard::{Decoder, Dictionary, KeyOutput};

/// Typing bursts that press and release every break-coded modifier must
/// leave the latches clear, whatever lands in between.
#[test]
fn balanced_sequences_clear_all_latches() {
    let sequences: &[&[u8]] = &[
        &[0x54, 0x23, 0xD4],
        &[0x57, 0x23, 0xD7, 0x54, 0x11, 0xD4],
        // sticky alt clears as a one-shot on the keypress
        &[0x54, 0x57, 0x68, 0x23, 0xD4, 0xD7],
        // a second alt press cancels the first
        &[0x68, 0x68],
        &[0x56, 0xEE, 0x23, 0xD6],
    ];

    for (i, sequence) in sequences.iter().enumerate() {
        let mut decoder = Decoder::new(Dictionary::us());
        for &scancode in *sequence {
            decoder.decode(scancode);
        }
        assert!(decoder.modifiers_clear(), "sequence {i} left a latch set");
    }
}

#[test]
fn typing_a_word_with_shift_held() {
    let mut decoder = Decoder::new(Dictionary::us());
    let mut typed = Vec::new();

    for &scancode in &[0x54u8, 0x16, 0x28, 0xD4, 0x0F, 0x25, 0x16, 0x23, 0x24, 0x23] {
        if let Some(KeyOutput::Bytes(bytes)) = decoder.decode(scancode) {
            typed.extend_from_slice(&bytes);
        }
    }
    assert_eq!(typed, b"HI there");
}

#[test]
fn arrow_keys_work_in_both_layouts() {
    for dict in [Dictionary::us(), Dictionary::es()] {
        let mut decoder = Decoder::new(dict);
        assert_eq!(
            decoder.decode(0x63),
            Some(KeyOutput::Bytes(b"\x1bA".to_vec()))
        );
        assert_eq!(
            decoder.decode(0x61),
            Some(KeyOutput::Bytes(b"\x1bD".to_vec()))
        );
    }
}

#[test]
fn decoder_reset_drops_latches_and_caps() {
    let mut decoder = Decoder::new(Dictionary::us());
    decoder.decode(0x54); // shift held
    decoder.decode(0x7E); // caps on

    decoder.reset();
    assert!(decoder.modifiers_clear());
    // caps is gone too: a letter comes out lowercase
    assert_eq!(decoder.decode(0x23), Some(KeyOutput::Bytes(b"e".to_vec())));
}
