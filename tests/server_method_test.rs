//! RPC 地址拆分测试

use flare_dtm_driver::{DiscoveryDriver, Driver, DriverConfig, ErrorCode, parse_server_method};

#[test]
fn plain_service_method() {
    let (server, method) = parse_server_method("svcA/methodB").unwrap();
    assert_eq!(server, "svcA");
    assert_eq!(method, "/methodB");

    let (server, method) = parse_server_method("dtm.Busi/TransIn").unwrap();
    assert_eq!(server, "dtm.Busi");
    assert_eq!(method, "/TransIn");
}

#[test]
fn url_service_method() {
    let (server, method) = parse_server_method("grpc://host:1234/svcA/methodB").unwrap();
    assert_eq!(server, "grpc://host:1234/svcA");
    assert_eq!(method, "/methodB");

    let (server, method) =
        parse_server_method("discovery:///busi.Busi/TransOut").unwrap();
    assert_eq!(server, "discovery:///busi.Busi");
    assert_eq!(method, "/TransOut");

    let (server, method) =
        parse_server_method("etcd://127.0.0.1:2379/dtmservice/dtmgimp.Dtm/Submit").unwrap();
    assert_eq!(server, "etcd://127.0.0.1:2379/dtmservice");
    assert_eq!(method, "/dtmgimp.Dtm/Submit");
}

#[test]
fn invalid_inputs_are_bad_url() {
    for uri in ["svcA", "", "grpc://host:1234", "grpc://host:1234/", "http://[::1/svc/m"] {
        let err = parse_server_method(uri).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadUrl, "{uri}");
    }
}

#[test]
fn driver_delegates_to_splitter() {
    let driver = DiscoveryDriver::new(DriverConfig::default());
    assert_eq!(
        driver.parse_server_method("svcA/methodB").unwrap(),
        ("svcA".to_string(), "/methodB".to_string())
    );
}
