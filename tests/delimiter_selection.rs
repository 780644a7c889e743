use arbor::ArborError;
use arbor::codec::{choose_delimiter, Codec, FieldReader, DEFAULT_CANDIDATES};
use arbor::datatype::Value;

fn all_candidates_but(skip: u8) -> String {
    DEFAULT_CANDIDATES
        .iter()
        .filter(|&&c| c != skip)
        .map(|&c| c as char)
        .collect()
}

#[test]
fn first_free_candidate_wins() {
    assert_eq!(choose_delimiter("", DEFAULT_CANDIDATES).unwrap(), b'|');
    assert_eq!(choose_delimiter("a|b", DEFAULT_CANDIDATES).unwrap(), b'~');
    assert_eq!(choose_delimiter("|~^", DEFAULT_CANDIDATES).unwrap(), b'!');
    // characters outside the candidate list never matter
    assert_eq!(choose_delimiter("é\u{1f600}\t", DEFAULT_CANDIDATES).unwrap(), b'|');
}

#[test]
fn the_single_missing_candidate_is_chosen() {
    for skip in [b'|', b'Q', b'7', b'"'] {
        let payload = all_candidates_but(skip);
        assert_eq!(choose_delimiter(&payload, DEFAULT_CANDIDATES).unwrap(), skip);
    }
    let payload = all_candidates_but(b'Q');
    let text = Value::from(payload.as_str()).encode().unwrap();
    assert_eq!(text.as_bytes()[0], b'Q');
    assert_eq!(Value::decode(&text).unwrap(), Value::from(payload.as_str()));
}

#[test]
fn exhausting_every_candidate_fails() {
    let payload: String = DEFAULT_CANDIDATES.iter().map(|&c| c as char).collect();
    assert!(matches!(
        choose_delimiter(&payload, DEFAULT_CANDIDATES),
        Err(ArborError::EncodingExhausted)
    ));
    assert!(matches!(
        Value::from(payload.as_str()).encode(),
        Err(ArborError::EncodingExhausted)
    ));
}

#[test]
fn custom_candidate_lists() {
    let codec = Codec::new(b"#|".to_vec()).unwrap();
    assert_eq!(Value::from(1.0).encode_with(&codec).unwrap(), "#N#1#");
    assert_eq!(Value::from("a#b").encode_with(&codec).unwrap(), "|S|a#b|");
    assert!(matches!(
        Value::from("#|").encode_with(&codec),
        Err(ArborError::EncodingExhausted)
    ));
    // decoding never needs the list
    assert_eq!(Value::decode("#N#1#").unwrap(), Value::from(1.0));
    assert!(matches!(Codec::new(Vec::new()), Err(ArborError::InvalidArgument(_))));
    assert!(matches!(Codec::new(b"|\t".to_vec()), Err(ArborError::InvalidArgument(_))));
}

#[test]
fn fields_are_read_back_positionally() {
    let codec = Codec::default();
    let mut writer = codec.writer();
    writer.push("").push("two words").push_count(3).push_display(2.5);
    let text = writer.finish().unwrap();
    assert_eq!(text, "||two words|3|2.5|");

    let mut reader = FieldReader::open(&text).unwrap();
    assert_eq!(reader.delimiter(), b'|');
    assert_eq!(reader.remaining(), 4);
    assert_eq!(reader.next("empty").unwrap(), "");
    assert_eq!(reader.next("words").unwrap(), "two words");
    assert_eq!(reader.next_count("count").unwrap(), 3);
    assert_eq!(reader.next_parse::<f64>("number").unwrap(), 2.5);
    assert!(matches!(reader.next("missing"), Err(ArborError::Codec(_))));
    reader.finish().unwrap();

    let empty = codec.writer().finish().unwrap();
    assert_eq!(empty, "|");
    assert_eq!(FieldReader::open(&empty).unwrap().remaining(), 0);
}

#[test]
fn counts_beyond_the_input_are_rejected() {
    let mut reader = FieldReader::open("|99|a|b|").unwrap();
    assert!(matches!(reader.next_count_of("pairs", 2), Err(ArborError::Codec(_))));
    let mut reader = FieldReader::open("|1|a|b|").unwrap();
    assert_eq!(reader.next_count_of("pairs", 2).unwrap(), 1);
}

#[test]
fn the_placeholder_byte_cannot_be_encoded() {
    assert!(matches!(Value::from("a\u{0}b").encode(), Err(ArborError::Codec(_))));
}
