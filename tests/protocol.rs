//! Wire-level encoder and decoder behavior.

use powerhub::serial::protocol::{
    decode_line, encode_query_state, encode_set_mode, PortMode, ProtocolError, ResponseLine,
};

#[test]
fn mode_command_encodes_lowercase_letter_and_port() {
    assert_eq!(
        encode_set_mode(PortMode::Charge, Some(3), 8).unwrap(),
        "mode c 3"
    );
    assert_eq!(
        encode_set_mode(PortMode::SyncCharge, Some(1), 8).unwrap(),
        "mode b 1"
    );
    assert_eq!(encode_set_mode(PortMode::Off, None, 8).unwrap(), "mode o");
}

#[test]
fn out_of_range_ports_never_encode() {
    assert!(matches!(
        encode_set_mode(PortMode::Sync, Some(0), 8),
        Err(ProtocolError::InvalidArgument(_))
    ));
    assert!(matches!(
        encode_set_mode(PortMode::Sync, Some(9), 8),
        Err(ProtocolError::InvalidArgument(_))
    ));
    assert!(matches!(
        encode_query_state(15, 8),
        Err(ProtocolError::InvalidArgument(_))
    ));
    assert_eq!(encode_query_state(8, 8).unwrap(), "state 8");
}

#[test]
fn blank_and_prompt_lines_classify() {
    assert_eq!(decode_line("   "), ResponseLine::Blank);
    assert_eq!(decode_line(""), ResponseLine::Blank);
    assert_eq!(decode_line(">>"), ResponseLine::Prompt);
    assert_eq!(decode_line(">> "), ResponseLine::Prompt);
}

#[test]
fn state_row_decodes_all_fields() {
    let line = "3, 512, 0000 A C, 4, 120, x, 1.25";
    match decode_line(line) {
        ResponseLine::State(row) => {
            assert_eq!(row.port, 3);
            assert_eq!(row.current_ma, 512);
            assert_eq!(row.mode, PortMode::Charge);
            assert!(row.attached);
            assert_eq!(row.profile_id, 4);
            assert_eq!(row.time_charging_s, 120);
            assert_eq!(row.time_charged_s, None);
            assert!((row.energy_wh - 1.25).abs() < 1e-9);
        }
        other => panic!("expected state row, got {:?}", other),
    }
}

#[test]
fn charge_phase_letters_all_decode_to_charge_mode() {
    for phase in ['C', 'P', 'I', 'F'] {
        let line = format!("1, 100, 0000 A {}, 0, 5, 30, 0.10", phase);
        match decode_line(&line) {
            ResponseLine::State(row) => assert_eq!(row.mode, PortMode::Charge),
            other => panic!("phase {} did not decode: {:?}", phase, other),
        }
    }
}

#[test]
fn detached_off_row_decodes() {
    match decode_line("8, 0, 0000 D O, 0, 0, 345, 0.00") {
        ResponseLine::State(row) => {
            assert_eq!(row.mode, PortMode::Off);
            assert!(!row.attached);
            assert_eq!(row.time_charged_s, Some(345));
        }
        other => panic!("expected state row, got {:?}", other),
    }
}

#[test]
fn unknown_mode_letter_is_not_guessed() {
    // `Z` is not in the vendor vocabulary; the row must not parse.
    assert_eq!(
        decode_line("1, 0, 0000 D Z, 0, 0, x, 0.00"),
        ResponseLine::Other("1, 0, 0000 D Z, 0, 0, x, 0.00".to_string())
    );
}

#[test]
fn short_rows_fall_through_to_other() {
    assert_eq!(
        decode_line("1, 0, 0000 D O, 0, 0, x"),
        ResponseLine::Other("1, 0, 0000 D O, 0, 0, x".to_string())
    );
}

#[test]
fn error_lines_carry_code_and_reason() {
    assert_eq!(
        decode_line("*E027: Port number out of range"),
        ResponseLine::DeviceError {
            code: 27,
            reason: "Port number out of range".to_string(),
            fatal: false,
        }
    );
    // An `E` without the three-digit-colon shape is skipped over.
    assert_eq!(
        decode_line("*ERR E031: over temperature"),
        ResponseLine::DeviceError {
            code: 31,
            reason: "over temperature".to_string(),
            fatal: false,
        }
    );
}

#[test]
fn fatal_error_lines_are_flagged() {
    // Canonical form; the `E` of "ERROR" must not be mistaken for the
    // code marker.
    assert_eq!(
        decode_line("*FATAL ERROR E102: PSU voltage low"),
        ResponseLine::DeviceError {
            code: 102,
            reason: "PSU voltage low".to_string(),
            fatal: true,
        }
    );
    assert_eq!(
        decode_line("*FATAL boot failure E102: PSU voltage low"),
        ResponseLine::DeviceError {
            code: 102,
            reason: "PSU voltage low".to_string(),
            fatal: true,
        }
    );
}

#[test]
fn malformed_error_lines_stay_other() {
    // Two digits instead of three.
    assert_eq!(
        decode_line("*E27: nope"),
        ResponseLine::Other("*E27: nope".to_string())
    );
    assert_eq!(
        decode_line("*banner text"),
        ResponseLine::Other("*banner text".to_string())
    );
}

#[test]
fn free_text_classifies_as_other() {
    assert_eq!(
        decode_line("hardware: PP8S"),
        ResponseLine::Other("hardware: PP8S".to_string())
    );
}
