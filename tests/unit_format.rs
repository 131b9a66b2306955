#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use memballast::{format_bytes, format_size, SIZES};

#[test]
fn unit_table_is_ordered() {
    assert_eq!(SIZES, ["B", "kB", "MB", "GB", "TB", "PB", "EB"]);
}

#[test]
fn bytes_below_base_stay_whole() {
    assert_eq!(format_bytes(0), "0 B");
    assert_eq!(format_bytes(512), "512 B");
}

#[test]
fn kilobytes_stay_whole() {
    assert_eq!(format_bytes(1024), "1 kB");
    assert_eq!(format_bytes(10 * 1024), "10 kB");
}

#[test]
fn larger_units_get_two_decimals() {
    assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.00 GB");
    assert_eq!(format_bytes(5_207_647_846), "4.85 GB");
}

#[test]
fn decimal_base_works_too() {
    assert_eq!(format_size(1_000_000.0, 1000.0), "1.00 MB");
}
