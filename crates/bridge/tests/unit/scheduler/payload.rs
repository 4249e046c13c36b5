use cosim_bridge::scheduler::MalformedPayload;
use cosim_bridge::scheduler::payload::{check_element_width, decode_f64s, decode_i32s, describe};
use rstest::rstest;

#[rstest]
#[case(0, 8, Ok(0))]
#[case(16, 8, Ok(2))]
#[case(12, 4, Ok(3))]
#[case(7, 8, Err(MalformedPayload { len: 7, width: 8 }))]
#[case(4, 0, Err(MalformedPayload { len: 4, width: 0 }))]
fn test_check_element_width(
    #[case] len: usize,
    #[case] width: usize,
    #[case] expected: Result<usize, MalformedPayload>,
) {
    assert_eq!(check_element_width(&vec![0; len], width), expected);
}

#[test]
fn test_decode_i32s_little_endian() {
    let data = [1, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF];
    assert_eq!(decode_i32s(&data).unwrap(), vec![1, -1]);
    assert!(decode_i32s(&data[..5]).is_err());
}

#[test]
fn test_decode_f64s() {
    let mut data = 1.5f64.to_le_bytes().to_vec();
    data.extend_from_slice(&(-0.25f64).to_le_bytes());
    assert_eq!(decode_f64s(&data).unwrap(), vec![1.5, -0.25]);
}

#[test]
fn test_describe_falls_back_to_hex() {
    assert_eq!(describe(&[2, 0, 0, 0], 4), "[2]");
    assert_eq!(describe(&[0xAB, 0x01, 0x02], 4), "[ab 01 02]");
    assert_eq!(describe(&[0x10, 0x20], 2), "[10 20]");
    assert_eq!(describe(&[], 8), "[]");
}
