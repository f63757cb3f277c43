//! Tagsieve Tag Data Translation
//!
//! Decodes the binary `(pc, id)` pair a reader reports into the
//! canonical URN form, per the EPC Tag Data Standard for EPC schemes
//! and ISO 17363/17365 for ISO schemes.
//!
//! # Modules
//!
//! - [`bitfield`]: Bit-aligned big-endian field reader
//! - [`epc`]: SGTIN/SSCC/GRAI/GIAI layouts and partition tables
//! - [`iso`]: 6-bit alphanumeric codec and ISO identifiers
//! - [`error`]: Error types

pub mod bitfield;
pub mod epc;
pub mod error;
pub mod iso;

pub use error::DecodeError;

/// Protocol-control word length in bytes.
const PC_BYTES: usize = 2;

/// Translates protocol-control bits and identifier bytes into a URN.
///
/// The first identifier byte selects the scheme; the PC word is
/// carried by every reader report and checked for shape only.
pub fn translate(pc: &[u8], id: &[u8]) -> Result<String, DecodeError> {
    if pc.len() < PC_BYTES {
        return Err(DecodeError::Truncated { needed: PC_BYTES * 8, got: pc.len() * 8 });
    }
    let header = *id.first().ok_or(DecodeError::Truncated { needed: 8, got: 0 })?;
    match header {
        epc::HEADER_SGTIN_96 => epc::decode_sgtin_96(id),
        epc::HEADER_SSCC_96 => epc::decode_sscc_96(id),
        epc::HEADER_GRAI_96 => epc::decode_grai_96(id),
        epc::HEADER_GIAI_96 => epc::decode_giai_96(id),
        iso::HEADER_ISO_17363 => iso::decode_iso(id, 17363),
        iso::HEADER_ISO_17365 => iso::decode_iso(id, 17365),
        other => Err(DecodeError::UnknownScheme(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPC_PC: [u8; 2] = [0x30, 0x00];

    /// The reference translation table: every partition width of each
    /// EPC scheme plus both ISO identifiers.
    #[test]
    fn test_translate_vectors() {
        let vectors: &[(&[u8], &[u8], &str)] = &[
            // SGTIN-96, partitions 0 through 6
            (
                &EPC_PC,
                &[48, 96, 114, 250, 100, 104, 80, 64, 0, 0, 0, 1],
                "urn:epc:id:sgtin:3.123456789012.1.1",
            ),
            (
                &EPC_PC,
                &[48, 100, 91, 251, 131, 134, 160, 64, 0, 0, 0, 1],
                "urn:epc:id:sgtin:3.12345678901.1.1",
            ),
            (
                &EPC_PC,
                &[48, 104, 73, 150, 2, 210, 0, 64, 0, 0, 0, 1],
                "urn:epc:id:sgtin:3.1234567890.1.1",
            ),
            (
                &EPC_PC,
                &[48, 108, 117, 188, 209, 80, 0, 64, 0, 0, 0, 1],
                "urn:epc:id:sgtin:3.123456789.1.1",
            ),
            (
                &EPC_PC,
                &[48, 112, 94, 48, 167, 0, 0, 64, 0, 0, 0, 1],
                "urn:epc:id:sgtin:3.12345678.1.1",
            ),
            (
                &EPC_PC,
                &[48, 116, 75, 90, 28, 0, 0, 64, 0, 0, 0, 1],
                "urn:epc:id:sgtin:3.1234567.1.1",
            ),
            (
                &EPC_PC,
                &[48, 120, 120, 144, 0, 0, 0, 64, 0, 0, 0, 1],
                "urn:epc:id:sgtin:3.123456.1.1",
            ),
            // SSCC-96, partitions 0 through 6
            (
                &EPC_PC,
                &[49, 96, 114, 250, 100, 104, 80, 0, 1, 0, 0, 0],
                "urn:epc:id:sscc:3.123456789012.1",
            ),
            (
                &EPC_PC,
                &[49, 100, 91, 251, 131, 134, 160, 0, 1, 0, 0, 0],
                "urn:epc:id:sscc:3.12345678901.1",
            ),
            (
                &EPC_PC,
                &[49, 104, 73, 150, 2, 210, 0, 0, 1, 0, 0, 0],
                "urn:epc:id:sscc:3.1234567890.1",
            ),
            (
                &EPC_PC,
                &[49, 108, 117, 188, 209, 80, 0, 0, 1, 0, 0, 0],
                "urn:epc:id:sscc:3.123456789.1",
            ),
            (
                &EPC_PC,
                &[49, 112, 94, 48, 167, 0, 0, 0, 1, 0, 0, 0],
                "urn:epc:id:sscc:3.12345678.1",
            ),
            (
                &EPC_PC,
                &[49, 116, 75, 90, 28, 0, 0, 0, 1, 0, 0, 0],
                "urn:epc:id:sscc:3.1234567.1",
            ),
            (
                &EPC_PC,
                &[49, 120, 120, 144, 0, 0, 0, 0, 1, 0, 0, 0],
                "urn:epc:id:sscc:3.123456.1",
            ),
            // GRAI-96, partitions 0 through 6
            (
                &EPC_PC,
                &[51, 96, 114, 250, 100, 104, 80, 64, 0, 0, 0, 1],
                "urn:epc:id:grai:3.123456789012.1.1",
            ),
            (
                &EPC_PC,
                &[51, 100, 91, 251, 131, 134, 160, 64, 0, 0, 0, 1],
                "urn:epc:id:grai:3.12345678901.1.1",
            ),
            (
                &EPC_PC,
                &[51, 104, 73, 150, 2, 210, 0, 64, 0, 0, 0, 1],
                "urn:epc:id:grai:3.1234567890.1.1",
            ),
            (
                &EPC_PC,
                &[51, 108, 117, 188, 209, 80, 0, 64, 0, 0, 0, 1],
                "urn:epc:id:grai:3.123456789.1.1",
            ),
            (
                &EPC_PC,
                &[51, 112, 94, 48, 167, 0, 0, 64, 0, 0, 0, 1],
                "urn:epc:id:grai:3.12345678.1.1",
            ),
            (
                &EPC_PC,
                &[51, 116, 75, 90, 28, 0, 0, 64, 0, 0, 0, 1],
                "urn:epc:id:grai:3.1234567.1.1",
            ),
            (
                &EPC_PC,
                &[51, 120, 120, 144, 0, 0, 0, 64, 0, 0, 0, 1],
                "urn:epc:id:grai:3.123456.1.1",
            ),
            // GIAI-96, partitions 0 through 6
            (
                &EPC_PC,
                &[52, 96, 114, 250, 100, 104, 80, 0, 0, 0, 48, 57],
                "urn:epc:id:giai:3.123456789012.12345",
            ),
            (
                &EPC_PC,
                &[52, 100, 91, 251, 131, 134, 160, 0, 0, 0, 48, 57],
                "urn:epc:id:giai:3.12345678901.12345",
            ),
            (
                &EPC_PC,
                &[52, 104, 73, 150, 2, 210, 0, 0, 0, 0, 48, 57],
                "urn:epc:id:giai:3.1234567890.12345",
            ),
            (
                &EPC_PC,
                &[52, 108, 117, 188, 209, 80, 0, 0, 0, 0, 48, 57],
                "urn:epc:id:giai:3.123456789.12345",
            ),
            (
                &EPC_PC,
                &[52, 112, 94, 48, 167, 0, 0, 0, 0, 0, 48, 57],
                "urn:epc:id:giai:3.12345678.12345",
            ),
            (
                &EPC_PC,
                &[52, 116, 75, 90, 28, 0, 0, 0, 0, 0, 48, 57],
                "urn:epc:id:giai:3.1234567.12345",
            ),
            (
                &EPC_PC,
                &[52, 120, 120, 144, 0, 0, 0, 0, 0, 0, 48, 57],
                "urn:epc:id:giai:3.123456.12345",
            ),
            // ISO 17363 freight container
            (
                &[41, 169],
                &[220, 32, 66, 13, 92, 114, 207, 77, 118, 194],
                "urn:epc:id:iso:17363:7BABCU1234560",
            ),
            // ISO 17365 transport unit
            (
                &[113, 162],
                &[
                    203, 84, 213, 56, 16, 131, 193, 66, 1, 56, 188, 25, 61, 92, 6, 61,
                    44, 18, 20, 17, 9, 56, 124, 20, 32, 148, 241, 130,
                ],
                "urn:epc:id:iso:17365:25SUNABC0THANK0YOU0FOR0READING0THIS1",
            ),
        ];
        for (pc, id, want) in vectors {
            assert_eq!(translate(pc, id).as_deref(), Ok(*want), "id {id:?}");
        }
    }

    #[test]
    fn test_unknown_scheme() {
        assert_eq!(
            translate(&EPC_PC, &[0x99, 0, 0, 0]),
            Err(DecodeError::UnknownScheme(0x99))
        );
    }

    #[test]
    fn test_truncated_pc_and_id() {
        assert!(matches!(
            translate(&[0x30], &[0x30; 12]),
            Err(DecodeError::Truncated { .. })
        ));
        assert!(matches!(
            translate(&EPC_PC, &[]),
            Err(DecodeError::Truncated { .. })
        ));
        assert!(matches!(
            translate(&EPC_PC, &[0x31, 0x60, 0x72]),
            Err(DecodeError::Truncated { .. })
        ));
    }
}
