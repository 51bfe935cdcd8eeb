use lan_probe_rs::error::ErrorKind;
use lan_probe_rs::ports::{load_ports_from_path, parse_port_spec, parse_ports_str};

#[test]
fn range_yields_every_port_inclusive() {
    for (a, b) in [(1u16, 1u16), (20, 22), (1000, 1100), (65530, 65535)] {
        let ports = parse_port_spec(Some(format!("{a}-{b}").as_str())).expect("parse ok");
        let expected: Vec<u16> = (a..=b).collect();
        assert_eq!(ports, expected);
    }
}

#[test]
fn comma_list_sorted_and_filtered() {
    let ports = parse_port_spec(Some("443,22,80,0,65536")).expect("parse ok");
    assert_eq!(ports, vec![22, 80, 443]);
}

#[test]
fn mixed_spec() {
    let ports = parse_port_spec(Some("20-22,80")).expect("parse ok");
    assert_eq!(ports, vec![20, 21, 22, 80]);
    let overlapping = parse_port_spec(Some("21,20-22,22")).expect("parse ok");
    assert_eq!(overlapping, vec![20, 21, 22]);
}

#[test]
fn malformed_spec_is_config_error() {
    let err = parse_port_spec(Some("22,http")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigError);
}

#[test]
fn ports_file_parses_ranges_and_comments() {
    let input = r#"
        # common ports
        22
        80  # http
        443 # https
        8000-8002
        8001  # duplicate
    "#;
    let ports = parse_ports_str(input).expect("parse ok");
    assert_eq!(ports, vec![22, 80, 443, 8000, 8001, 8002]);
}

#[test]
fn missing_ports_file_is_io_error() {
    let err = load_ports_from_path("/definitely/not/here/ports.txt").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoError);
}
