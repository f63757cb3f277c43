//! EPC binary scheme decoding
//!
//! SGTIN-96, SSCC-96, GRAI-96 and GIAI-96. All share the shape
//! header(8) + filter(3) + partition(3) + company prefix + scheme
//! field(s); the partition value selects the split between the company
//! prefix and the adjacent field from a fixed table.

use crate::bitfield::BitReader;
use crate::error::DecodeError;

/// Scheme header bytes.
pub const HEADER_SGTIN_96: u8 = 0x30;
pub const HEADER_SSCC_96: u8 = 0x31;
pub const HEADER_GRAI_96: u8 = 0x33;
pub const HEADER_GIAI_96: u8 = 0x34;

/// Company-prefix width per partition value; the adjacent field takes
/// the remainder of the scheme's combined width.
const COMPANY_BITS: [usize; 7] = [40, 37, 34, 30, 27, 24, 20];

fn partition_split(partition: u8, combined: usize) -> Result<(usize, usize), DecodeError> {
    let company = *COMPANY_BITS
        .get(usize::from(partition))
        .ok_or(DecodeError::InvalidPartition(partition))?;
    Ok((company, combined - company))
}

/// Common front matter: skips the header, reads filter and partition.
fn read_preamble(reader: &mut BitReader<'_>) -> Result<(u64, u8), DecodeError> {
    reader.skip(8)?;
    let filter = reader.read(3)?;
    let partition = reader.read(3)? as u8;
    Ok((filter, partition))
}

pub(crate) fn decode_sgtin_96(id: &[u8]) -> Result<String, DecodeError> {
    let mut reader = BitReader::new(id);
    let (filter, partition) = read_preamble(&mut reader)?;
    let (company_bits, item_bits) = partition_split(partition, 44)?;
    let company = reader.read(company_bits)?;
    let item = reader.read(item_bits)?;
    let serial = reader.read(38)?;
    Ok(format!("urn:epc:id:sgtin:{filter}.{company}.{item}.{serial}"))
}

pub(crate) fn decode_sscc_96(id: &[u8]) -> Result<String, DecodeError> {
    let mut reader = BitReader::new(id);
    let (filter, partition) = read_preamble(&mut reader)?;
    let (company_bits, serial_bits) = partition_split(partition, 58)?;
    let company = reader.read(company_bits)?;
    let serial_ref = reader.read(serial_bits)?;
    // 24 trailing bits are reserved
    Ok(format!("urn:epc:id:sscc:{filter}.{company}.{serial_ref}"))
}

pub(crate) fn decode_grai_96(id: &[u8]) -> Result<String, DecodeError> {
    let mut reader = BitReader::new(id);
    let (filter, partition) = read_preamble(&mut reader)?;
    let (company_bits, asset_bits) = partition_split(partition, 44)?;
    let company = reader.read(company_bits)?;
    let asset_type = reader.read(asset_bits)?;
    let serial = reader.read(38)?;
    Ok(format!("urn:epc:id:grai:{filter}.{company}.{asset_type}.{serial}"))
}

pub(crate) fn decode_giai_96(id: &[u8]) -> Result<String, DecodeError> {
    let mut reader = BitReader::new(id);
    let (filter, partition) = read_preamble(&mut reader)?;
    let (company_bits, asset_bits) = partition_split(partition, 82)?;
    let company = reader.read(company_bits)?;
    let asset_ref = reader.read(asset_bits)?;
    Ok(format!("urn:epc:id:giai:{filter}.{company}.{asset_ref}"))
}
