//! Integration tests for the stratum dialect as a whole.

use crate::message::{Method, Request};
use crate::{epoch_from_prime_terminus_number, EPOCH_LENGTH};

#[test]
fn method_parses_known_names() {
    assert_eq!(Method::from("mining.hello"), Method::Hello);
    assert_eq!(Method::from("mining.subscribe"), Method::Subscribe);
    assert_eq!(Method::from("mining.authorize"), Method::Authorize);
    assert_eq!(Method::from("mining.submit"), Method::Submit);
    assert_eq!(Method::from("mining.bye"), Method::Bye);
    assert_eq!(
        Method::from("mining.configure"),
        Method::Other("mining.configure".to_string())
    );
}

#[test]
fn request_params_array_accessors() {
    let request: Request =
        serde_json::from_str(r#"{"id":7,"method":"mining.submit","params":["0","abcd1234"]}"#)
            .unwrap();
    assert_eq!(request.param_str(0), Some("0"));
    assert_eq!(request.param_str(1), Some("abcd1234"));
    assert_eq!(request.param_str(2), None);
}

#[test]
fn request_missing_params_defaults_to_null() {
    let request: Request =
        serde_json::from_str(r#"{"id":1,"method":"mining.hello"}"#).unwrap();
    assert!(request.params_array().is_empty());
}

#[test]
fn epoch_derivation_is_a_simple_floor_division() {
    assert_eq!(epoch_from_prime_terminus_number(0), 0);
    assert_eq!(epoch_from_prime_terminus_number(EPOCH_LENGTH - 1), 0);
    assert_eq!(epoch_from_prime_terminus_number(EPOCH_LENGTH), 1);
    assert_eq!(epoch_from_prime_terminus_number(EPOCH_LENGTH * 3 + 5), 3);
}
