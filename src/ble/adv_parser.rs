use heapless::String;

use crate::config::{DEVICE_NAME_LEN, UNKNOWN_DEVICE_NAME};

/// AD type: incomplete list of 128-bit service UUIDs.
const AD_TYPE_UUID128_INCOMPLETE: u8 = 0x06;
/// AD type: complete list of 128-bit service UUIDs.
const AD_TYPE_UUID128_COMPLETE: u8 = 0x07;
/// AD type: shortened local name.
const AD_TYPE_SHORT_NAME: u8 = 0x08;
/// AD type: complete local name.
const AD_TYPE_COMPLETE_NAME: u8 = 0x09;

/// Display name extracted from an advertisement.
pub type DeviceName = String<DEVICE_NAME_LEN>;

/// Iterate the `(type, value)` pairs of an advertisement.
///
/// Stops at the first zero-length field or at a field that would run past
/// the end of `data`; nothing beyond `data.len()` is ever touched.
fn ad_fields(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut i = 0;
    core::iter::from_fn(move || {
        let len = *data.get(i)? as usize;
        if len == 0 || i + len >= data.len() {
            return None;
        }
        let ad_type = data[i + 1];
        let value = &data[i + 2..i + 1 + len];
        i += len + 1;
        Some((ad_type, value))
    })
}

/// Check if raw advertisement data lists `target` (128-bit, little-endian)
/// among its service UUIDs.
pub fn contains_service_uuid128(data: &[u8], target: &[u8; 16]) -> bool {
    ad_fields(data)
        .filter(|(ad_type, _)| {
            *ad_type == AD_TYPE_UUID128_INCOMPLETE || *ad_type == AD_TYPE_UUID128_COMPLETE
        })
        .any(|(_, uuids)| uuids.chunks_exact(16).any(|uuid| uuid == target))
}

/// Extract complete/shortened local name from advertisement data.
///
/// Names longer than [`DEVICE_NAME_LEN`] are truncated. Peripherals without
/// a name field get [`UNKNOWN_DEVICE_NAME`].
pub fn extract_device_name(data: &[u8]) -> DeviceName {
    let field = ad_fields(data).find(|(ad_type, _)| {
        *ad_type == AD_TYPE_SHORT_NAME || *ad_type == AD_TYPE_COMPLETE_NAME
    });

    let mut name = String::new();
    match field {
        Some((_, name_bytes)) => {
            for &b in name_bytes {
                if name.push(b as char).is_err() {
                    break;
                }
            }
        }
        None => {
            let _ = name.push_str(UNKNOWN_DEVICE_NAME);
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BLEHTTP_BASE_UUID;

    fn uuid_field(ad_type: u8, uuid: &[u8; 16]) -> [u8; 18] {
        let mut field = [0u8; 18];
        field[0] = 17;
        field[1] = ad_type;
        field[2..].copy_from_slice(uuid);
        field
    }

    #[test]
    fn detects_complete_uuid128_list() {
        let ad_data = uuid_field(0x07, &BLEHTTP_BASE_UUID);
        assert!(contains_service_uuid128(&ad_data, &BLEHTTP_BASE_UUID));
    }

    #[test]
    fn detects_incomplete_uuid128_list() {
        let ad_data = uuid_field(0x06, &BLEHTTP_BASE_UUID);
        assert!(contains_service_uuid128(&ad_data, &BLEHTTP_BASE_UUID));
    }

    #[test]
    fn detects_uuid_after_flags_and_name() {
        let mut ad_data = [0u8; 3 + 5 + 18];
        ad_data[..3].copy_from_slice(&[0x02, 0x01, 0x06]);
        ad_data[3..8].copy_from_slice(&[0x04, 0x09, b'g', b'w', b'y']);
        ad_data[8..].copy_from_slice(&uuid_field(0x07, &BLEHTTP_BASE_UUID));
        assert!(contains_service_uuid128(&ad_data, &BLEHTTP_BASE_UUID));
    }

    #[test]
    fn detects_second_uuid_in_one_field() {
        let mut other = BLEHTTP_BASE_UUID;
        other[0] ^= 0xFF;
        let mut ad_data = [0u8; 34];
        ad_data[0] = 33;
        ad_data[1] = 0x07;
        ad_data[2..18].copy_from_slice(&other);
        ad_data[18..].copy_from_slice(&BLEHTTP_BASE_UUID);
        assert!(contains_service_uuid128(&ad_data, &BLEHTTP_BASE_UUID));
    }

    #[test]
    fn rejects_other_uuid128() {
        let mut other = BLEHTTP_BASE_UUID;
        other[12] = 0x02;
        let ad_data = uuid_field(0x07, &other);
        assert!(!contains_service_uuid128(&ad_data, &BLEHTTP_BASE_UUID));
    }

    #[test]
    fn ignores_uuid_bytes_in_other_field_types() {
        // Same 16 bytes, but tagged as manufacturer data.
        let ad_data = uuid_field(0xFF, &BLEHTTP_BASE_UUID);
        assert!(!contains_service_uuid128(&ad_data, &BLEHTTP_BASE_UUID));
    }

    #[test]
    fn empty_advertisement_data() {
        assert!(!contains_service_uuid128(&[], &BLEHTTP_BASE_UUID));
    }

    #[test]
    fn malformed_ad_length_zero() {
        // A zero length would loop forever if not treated as the end.
        let ad_data = [0x00, 0x07, 0x30, 0xb3];
        assert!(!contains_service_uuid128(&ad_data, &BLEHTTP_BASE_UUID));
        assert_eq!(extract_device_name(&ad_data).as_str(), "?");
    }

    #[test]
    fn field_running_past_end_is_not_read() {
        // Declares 17 bytes but only 10 follow.
        let full = uuid_field(0x07, &BLEHTTP_BASE_UUID);
        assert!(!contains_service_uuid128(&full[..12], &BLEHTTP_BASE_UUID));

        let name = [0x09, 0x09, b'g', b'a'];
        assert_eq!(extract_device_name(&name).as_str(), "?");
    }

    #[test]
    fn every_truncation_of_a_valid_report_is_safe() {
        let mut ad_data = [0u8; 3 + 18 + 6];
        ad_data[..3].copy_from_slice(&[0x02, 0x01, 0x06]);
        ad_data[3..21].copy_from_slice(&uuid_field(0x07, &BLEHTTP_BASE_UUID));
        ad_data[21..].copy_from_slice(&[0x05, 0x09, b'h', b't', b't', b'p']);
        for end in 0..=ad_data.len() {
            let slice = &ad_data[..end];
            let found = contains_service_uuid128(slice, &BLEHTTP_BASE_UUID);
            assert_eq!(found, end >= 21, "truncated at {}", end);
            let _ = extract_device_name(slice);
        }
    }

    #[test]
    fn extract_complete_local_name() {
        let ad_data = [
            0x0d, 0x09, b'h', b't', b't', b'p', b'-', b'g', b'a', b't', b'e', b'w', b'a', b'y',
        ];
        assert_eq!(extract_device_name(&ad_data).as_str(), "http-gateway");
    }

    #[test]
    fn extract_shortened_local_name() {
        let ad_data = [0x05, 0x08, b'h', b't', b't', b'p'];
        assert_eq!(extract_device_name(&ad_data).as_str(), "http");
    }

    #[test]
    fn no_name_in_advertisement() {
        let ad_data = [0x02, 0x01, 0x06];
        assert_eq!(extract_device_name(&ad_data).as_str(), "?");
    }

    #[test]
    fn name_truncated_to_capacity() {
        let mut ad_data = [0u8; 40];
        ad_data[0] = 37;
        ad_data[1] = 0x09;
        for b in ad_data[2..38].iter_mut() {
            *b = b'X';
        }
        let name = extract_device_name(&ad_data);
        assert_eq!(name.len(), DEVICE_NAME_LEN);
    }
}
