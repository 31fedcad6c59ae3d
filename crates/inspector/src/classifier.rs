//! Descriptor classification
//!
//! Total, side-effect free mappings from raw USB codes to labels.

use std::borrow::Cow;
use types::TransferType;

/// USB interface class codes recognized by the classifier
pub mod class_code {
    pub const AUDIO: u8 = 0x01;
    pub const COMM: u8 = 0x02;
    pub const HID: u8 = 0x03;
    pub const PRINTER: u8 = 0x07;
    pub const MASS_STORAGE: u8 = 0x08;
    pub const VIDEO: u8 = 0x0E;
    pub const VENDOR_SPECIFIC: u8 = 0xFF;
}

/// Label for a raw interface class code
///
/// Unrecognized codes yield `"code <N>"` with the decimal value.
pub fn classify_interface_class(code: u8) -> Cow<'static, str> {
    match code {
        class_code::AUDIO => Cow::Borrowed("Audio"),
        class_code::COMM => Cow::Borrowed("CDC (Communications)"),
        class_code::HID => Cow::Borrowed("HID (Human Interface Device)"),
        class_code::PRINTER => Cow::Borrowed("Printer"),
        class_code::MASS_STORAGE => Cow::Borrowed("Mass Storage"),
        class_code::VIDEO => Cow::Borrowed("Video"),
        class_code::VENDOR_SPECIFIC => Cow::Borrowed("Vendor Specific"),
        other => Cow::Owned(format!("code {}", other)),
    }
}

/// Transfer type for a raw endpoint type code
///
/// Codes outside 0..=3 map to [`TransferType::Unknown`].
pub fn endpoint_transfer_type(code: u8) -> TransferType {
    TransferType::from_code(code)
}

/// Label for a raw endpoint transfer type code
pub fn classify_endpoint_type(code: u8) -> &'static str {
    endpoint_transfer_type(code).label()
}
