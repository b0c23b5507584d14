use ampster::error::AmpsterError;
use ampster::fetcher::FetchError;

#[test]
fn error_constructors_group_1() {
    assert!(matches!(
        AmpsterError::config("x"),
        AmpsterError::Config { .. }
    ));
    assert!(matches!(AmpsterError::fetch("x"), AmpsterError::Fetch { .. }));
    assert!(matches!(
        AmpsterError::upload("x"),
        AmpsterError::Upload { .. }
    ));
    assert!(matches!(
        AmpsterError::not_ready("x"),
        AmpsterError::NotReady { .. }
    ));
    assert!(matches!(AmpsterError::web("x"), AmpsterError::Web { .. }));
}

#[test]
fn error_constructors_group_2() {
    let ser = AmpsterError::Serialization {
        message: "s".into(),
    };
    assert!(matches!(ser, AmpsterError::Serialization { .. }));
    assert!(matches!(AmpsterError::io("x"), AmpsterError::Io { .. }));
    assert!(matches!(
        AmpsterError::network("x"),
        AmpsterError::Network { .. }
    ));
    assert!(matches!(
        AmpsterError::validation("f", "m"),
        AmpsterError::Validation { .. }
    ));
    assert!(matches!(
        AmpsterError::timeout("x"),
        AmpsterError::Timeout { .. }
    ));
    assert!(matches!(
        AmpsterError::generic("x"),
        AmpsterError::Generic { .. }
    ));
}

#[test]
fn fetch_errors_convert() {
    let err: AmpsterError = FetchError::TooLarge { limit: 10 }.into();
    assert!(matches!(err, AmpsterError::Fetch { .. }));
    assert!(err.to_string().contains("10 bytes"));
}

#[test]
fn display_messages() {
    let e = AmpsterError::validation("field", "bad");
    let s = format!("{}", e);
    assert!(s.contains("Validation error"));
}
