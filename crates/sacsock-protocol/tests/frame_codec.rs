use sacsock_core::Payload;
use sacsock_protocol::{decode_frame, encode_frame, FrameError, PayloadTag, WireFrame};
use serde_json::json;

#[test]
fn string_payload_round_trips_on_a_text_frame() {
    let frame = encode_frame("hi", &Payload::Str("world".into()));
    assert!(!frame.is_binary());
    assert_eq!(frame.as_bytes(), b"hi\x01S\x02world");

    let decoded = decode_frame(frame.as_bytes()).unwrap();
    assert_eq!(decoded.event, "hi");
    assert_eq!(decoded.tag, PayloadTag::Str);
    assert_eq!(decoded.payload, b"world");
}

#[test]
fn binary_payload_round_trips_on_a_binary_frame() {
    // The payload may contain SOH and STX bytes; only the first STX splits.
    let frame = encode_frame("evt", &Payload::Bin(vec![0, 1, 2, 3]));
    assert!(frame.is_binary());
    assert_eq!(frame.as_bytes(), b"evt\x01B\x02\x00\x01\x02\x03");

    let decoded = decode_frame(frame.as_bytes()).unwrap();
    assert_eq!(decoded.event, "evt");
    assert_eq!(decoded.tag, PayloadTag::Bin);
    assert_eq!(decoded.payload, vec![0, 1, 2, 3]);
}

#[test]
fn json_payload_round_trips_on_a_text_frame() {
    let frame = encode_frame("update", &Payload::Json(json!({"n": 7})));
    assert!(!frame.is_binary());

    let decoded = decode_frame(frame.as_bytes()).unwrap();
    assert_eq!(decoded.event, "update");
    assert_eq!(decoded.tag, PayloadTag::Json);
    let value: serde_json::Value = serde_json::from_slice(&decoded.payload).unwrap();
    assert_eq!(value, json!({"n": 7}));
}

#[test]
fn only_the_bin_tag_selects_a_binary_frame() {
    assert!(encode_frame("e", &Payload::Bin(vec![1])).is_binary());
    assert!(!encode_frame("e", &Payload::Str("x".into())).is_binary());
    assert!(!encode_frame("e", &Payload::Json(json!(null))).is_binary());
}

#[test]
fn empty_payload_decodes_to_empty_bytes() {
    let decoded = decode_frame(b"evt\x01S\x02").unwrap();
    assert_eq!(decoded.event, "evt");
    assert_eq!(decoded.tag, PayloadTag::Str);
    assert!(decoded.payload.is_empty());
}

#[test]
fn empty_event_name_is_rejected() {
    assert_eq!(
        decode_frame(b"\x01S\x02x").unwrap_err(),
        FrameError::EmptyEventName
    );
}

#[test]
fn frame_without_stx_is_rejected() {
    assert_eq!(
        decode_frame(b"evt\x01Spayload").unwrap_err(),
        FrameError::MissingStx
    );
    assert_eq!(decode_frame(b"").unwrap_err(), FrameError::MissingStx);
}

#[test]
fn header_without_soh_is_rejected() {
    assert_eq!(
        decode_frame(b"evt\x02payload").unwrap_err(),
        FrameError::MissingSoh
    );
}

#[test]
fn unknown_type_tag_is_rejected() {
    assert_eq!(
        decode_frame(b"evt\x01Q\x02x").unwrap_err(),
        FrameError::UnknownTypeTag(b'Q')
    );
}

#[test]
fn header_with_extra_bytes_is_rejected() {
    assert_eq!(
        decode_frame(b"evt\x01SS\x02x").unwrap_err(),
        FrameError::MalformedHeader
    );
    assert_eq!(
        decode_frame(b"evt\x01\x02x").unwrap_err(),
        FrameError::MalformedHeader
    );
}

#[test]
fn non_utf8_event_name_is_rejected() {
    assert_eq!(
        decode_frame(b"\xff\xfe\x01S\x02x").unwrap_err(),
        FrameError::InvalidEventName
    );
}

#[test]
fn text_frames_are_valid_utf8_end_to_end() {
    let frame = encode_frame("héllo", &Payload::Str("wörld".into()));
    match frame {
        WireFrame::Text(s) => {
            let decoded = decode_frame(s.as_bytes()).unwrap();
            assert_eq!(decoded.event, "héllo");
            assert_eq!(decoded.payload, "wörld".as_bytes());
        }
        WireFrame::Binary(_) => panic!("string payload must use a text frame"),
    }
}
