//! # Descriptor Selection
//!
//! `GET_DESCRIPTOR` names a descriptor by type, index and language id. This
//! module maps such a triple to the bytes the device answers with. It does
//! not build descriptors; the tables are supplied by the device
//! configuration and are never modified.

use thiserror::Error;
use tracing::trace;

use crate::device::constants::{descriptor_offset, descriptor_type};

/// The descriptors a device can hand out.
///
/// All regions are raw descriptor bytes as they go on the wire.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorTables<'a> {
    /// The device descriptor.
    pub device: &'a [u8],
    /// The configuration descriptor, followed by all interface, endpoint and
    /// class descriptors that belong to it.
    pub configuration: &'a [u8],
    /// String descriptor zero, the list of supported language ids.
    pub language_ids: &'a [u8],
    /// String descriptors 1 to `strings.len()`.
    pub strings: &'a [&'a [u8]],
}

/// Errors when selecting a descriptor.
///
/// The dispatcher answers all of them with a stall.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorError {
    /// The descriptor type is not one this device provides.
    #[error("Unsupported descriptor type {0:#04x}")]
    UnknownType(u8),
    /// The string index is larger than the string table.
    #[error("String descriptor index {index} exceeds the {count} available strings")]
    StringIndexOutOfRange {
        /// The requested index.
        index: u8,
        /// The number of strings in the table (excluding string zero).
        count: usize,
    },
    /// The table entry has no bytes at all.
    #[error("Descriptor of type {0:#04x} is empty")]
    Empty(u8),
    /// The declared length is larger than the bytes in the table.
    #[error("Descriptor of type {descriptor_type:#04x} declares {declared} bytes, but only {available} are present")]
    Truncated {
        /// The type of the broken descriptor.
        descriptor_type: u8,
        /// The length the descriptor claims to have.
        declared: usize,
        /// The length of the table entry.
        available: usize,
    },
}

impl<'a> DescriptorTables<'a> {
    /// Select a descriptor.
    ///
    /// The returned region is exactly as long as the descriptor says it is:
    /// `bLength` for device and string descriptors, `wTotalLength` for the
    /// configuration descriptor. Truncating it to what the host asked for is
    /// up to the caller, see [`negotiate_length`].
    ///
    /// The language id is accepted for any value. Devices with more than one
    /// language are not supported.
    ///
    /// # Errors
    ///
    /// See [`DescriptorError`].
    pub fn select(
        &self,
        descriptor_type: u8,
        index: u8,
        language_id: u16,
    ) -> Result<&'a [u8], DescriptorError> {
        trace!(
            "selecting descriptor type={:#04x} index={} langid={:#06x}",
            descriptor_type,
            index,
            language_id
        );

        match descriptor_type {
            descriptor_type::DEVICE => length_prefixed(descriptor_type, self.device),
            descriptor_type::CONFIGURATION => total_length_prefixed(self.configuration),
            descriptor_type::STRING if index == 0 => {
                length_prefixed(descriptor_type, self.language_ids)
            }
            descriptor_type::STRING => {
                let string: &'a [u8] = *self
                    .strings
                    .get(usize::from(index) - 1)
                    .ok_or(DescriptorError::StringIndexOutOfRange {
                        index,
                        count: self.strings.len(),
                    })?;

                length_prefixed(descriptor_type, string)
            }
            other => Err(DescriptorError::UnknownType(other)),
        }
    }
}

/// The number of bytes to send for a descriptor of `actual` bytes when the
/// host asked for `requested`.
///
/// Hosts may legally ask for fewer bytes (e.g. the first 8 bytes of the
/// device descriptor) or for more.
#[must_use]
pub fn negotiate_length(actual: usize, requested: u16) -> usize {
    actual.min(usize::from(requested))
}

/// Cut `region` to the length its first byte declares.
fn length_prefixed(descriptor_type: u8, region: &[u8]) -> Result<&[u8], DescriptorError> {
    let declared = *region
        .get(descriptor_offset::LENGTH)
        .ok_or(DescriptorError::Empty(descriptor_type))?;

    declared_prefix(descriptor_type, region, usize::from(declared))
}

/// Cut a configuration descriptor to its `wTotalLength`.
fn total_length_prefixed(region: &[u8]) -> Result<&[u8], DescriptorError> {
    if region.is_empty() {
        return Err(DescriptorError::Empty(descriptor_type::CONFIGURATION));
    }

    let field = descriptor_offset::TOTAL_LENGTH..descriptor_offset::TOTAL_LENGTH + 2;
    let declared = match region.get(field) {
        Some(&[low, high]) => u16::from_le_bytes([low, high]),
        _ => {
            return Err(DescriptorError::Truncated {
                descriptor_type: descriptor_type::CONFIGURATION,
                declared: descriptor_offset::TOTAL_LENGTH + 2,
                available: region.len(),
            })
        }
    };

    declared_prefix(
        descriptor_type::CONFIGURATION,
        region,
        usize::from(declared),
    )
}

fn declared_prefix(
    descriptor_type: u8,
    region: &[u8],
    declared: usize,
) -> Result<&[u8], DescriptorError> {
    region.get(..declared).ok_or(DescriptorError::Truncated {
        descriptor_type,
        declared,
        available: region.len(),
    })
}


#[cfg(test)]
mod tests {
    use super::testutils::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn device_descriptor_uses_its_length_field() {
        assert_eq!(TABLES.select(descriptor_type::DEVICE, 0, 0), Ok(&DEVICE[..]));
    }

    #[test]
    fn configuration_descriptor_uses_total_length() {
        let selected = TABLES
            .select(descriptor_type::CONFIGURATION, 0, 0)
            .unwrap();

        assert_eq!(selected.len(), 32);
        assert_eq!(selected, &CONFIGURATION[..32]);
    }

    #[test]
    fn string_zero_is_the_language_list() {
        assert_eq!(
            TABLES.select(descriptor_type::STRING, 0, 0),
            Ok(&LANGUAGE_IDS[..])
        );
    }

    #[test]
    fn string_indices_are_one_based() {
        assert_eq!(
            TABLES.select(descriptor_type::STRING, 1, 0x0409),
            Ok(&MANUFACTURER[..])
        );
        assert_eq!(
            TABLES.select(descriptor_type::STRING, 2, 0x0409),
            Ok(&PRODUCT[..])
        );
    }

    #[test]
    fn string_index_past_table_fails() {
        for index in [3, 4, 0xee, 0xff] {
            assert_eq!(
                TABLES.select(descriptor_type::STRING, index, 0x0409),
                Err(DescriptorError::StringIndexOutOfRange { index, count: 2 })
            );
        }
    }

    #[test]
    fn unknown_descriptor_types_fail() {
        for ty in [0, descriptor_type::INTERFACE, descriptor_type::ENDPOINT, 0x29] {
            assert_eq!(TABLES.select(ty, 0, 0), Err(DescriptorError::UnknownType(ty)));
        }
    }

    #[test]
    fn broken_tables_are_rejected() {
        let short_device = [0x12, 0x01, 0x00];
        let tables = DescriptorTables {
            device: &short_device,
            configuration: &[0x09, 0x02, 0x00],
            language_ids: &[],
            strings: &[],
        };

        assert_eq!(
            tables.select(descriptor_type::DEVICE, 0, 0),
            Err(DescriptorError::Truncated {
                descriptor_type: descriptor_type::DEVICE,
                declared: 18,
                available: 3,
            })
        );
        assert!(matches!(
            tables.select(descriptor_type::CONFIGURATION, 0, 0),
            Err(DescriptorError::Truncated { .. })
        ));
        assert_eq!(
            tables.select(descriptor_type::STRING, 0, 0),
            Err(DescriptorError::Empty(descriptor_type::STRING))
        );
    }

    #[test]
    fn length_negotiation_examples() {
        assert_eq!(negotiate_length(18, 8), 8);
        assert_eq!(negotiate_length(18, 64), 18);
        assert_eq!(negotiate_length(32, 0xffff), 32);
        assert_eq!(negotiate_length(0, 64), 0);
    }

    proptest! {
        #[test]
        fn negotiated_length_is_minimum(actual in 0usize..70000, requested: u16) {
            let length = negotiate_length(actual, requested);

            prop_assert!(length <= actual);
            prop_assert!(length <= usize::from(requested));
            prop_assert!(length == actual || length == usize::from(requested));
        }
    }
}
