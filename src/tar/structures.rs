use byteorder::{BigEndian, ByteOrder};

/// Size of a tar header block; member data is padded to this granularity
pub const BLOCK_SIZE: u64 = 512;

/// Alias used by the index: data starts `HEADER_SIZE` bytes after `start`
pub const HEADER_SIZE: u64 = BLOCK_SIZE;

const NAME: std::ops::Range<usize> = 0..100;
const SIZE: std::ops::Range<usize> = 124..136;
const CHECKSUM: std::ops::Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const MAGIC: std::ops::Range<usize> = 257..263;
const PREFIX: std::ops::Range<usize> = 345..500;

/// Round `size` up to the next multiple of [`BLOCK_SIZE`], saturating at `u64::MAX`
pub fn padded_size(size: u64) -> u64 {
    size.div_ceil(BLOCK_SIZE).saturating_mul(BLOCK_SIZE)
}

/// Tar entry type flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Regular,
    HardLink,
    Symlink,
    CharDevice,
    BlockDevice,
    Directory,
    Fifo,
    Contiguous,
    PaxExtended,
    PaxGlobal,
    GnuLongName,
    GnuLongLink,
    Other(u8),
}

impl EntryType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            b'0' | b'\0' => EntryType::Regular,
            b'1' => EntryType::HardLink,
            b'2' => EntryType::Symlink,
            b'3' => EntryType::CharDevice,
            b'4' => EntryType::BlockDevice,
            b'5' => EntryType::Directory,
            b'6' => EntryType::Fifo,
            b'7' => EntryType::Contiguous,
            b'x' => EntryType::PaxExtended,
            b'g' => EntryType::PaxGlobal,
            b'L' => EntryType::GnuLongName,
            b'K' => EntryType::GnuLongLink,
            other => EntryType::Other(other),
        }
    }

    /// Whether this entry only carries metadata for the entry that follows
    pub fn is_metadata(&self) -> bool {
        matches!(
            self,
            EntryType::PaxExtended
                | EntryType::PaxGlobal
                | EntryType::GnuLongName
                | EntryType::GnuLongLink
        )
    }
}

/// One parsed 512-byte tar header block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarHeader {
    pub name: String,
    pub size: u64,
    pub entry_type: EntryType,
}

/// Why a header block could not be parsed
pub type HeaderError = String;

impl TarHeader {
    /// Whether a block is all zeros, which marks the end of the archive
    pub fn is_end_marker(block: &[u8; BLOCK_SIZE as usize]) -> bool {
        block.iter().all(|&b| b == 0)
    }

    pub fn from_block(block: &[u8; BLOCK_SIZE as usize]) -> Result<Self, HeaderError> {
        let stored = parse_octal(&block[CHECKSUM]).ok_or("invalid checksum field")?;
        let computed = checksum(block);
        if stored != computed {
            return Err(format!(
                "checksum mismatch (stored {stored}, computed {computed})"
            ));
        }

        let size = parse_numeric(&block[SIZE]).ok_or("invalid size field")?;
        let entry_type = EntryType::from_u8(block[TYPEFLAG]);

        let mut name = null_terminated(&block[NAME]);
        // GNU headers ("ustar  ") reuse the prefix area for other fields
        if &block[MAGIC] == b"ustar\0" {
            let prefix = null_terminated(&block[PREFIX]);
            if !prefix.is_empty() {
                name = format!("{prefix}/{name}");
            }
        }

        Ok(Self {
            name,
            size,
            entry_type,
        })
    }
}

/// Unsigned sum of the block with the checksum field counted as spaces
fn checksum(block: &[u8; BLOCK_SIZE as usize]) -> u64 {
    block
        .iter()
        .enumerate()
        .map(|(i, &b)| u64::from(if CHECKSUM.contains(&i) { b' ' } else { b }))
        .sum()
}

fn null_terminated(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Parse an octal field padded with NULs or spaces
fn parse_octal(field: &[u8]) -> Option<u64> {
    let text = field
        .iter()
        .position(|&b| b == 0)
        .map_or(field, |end| &field[..end]);
    let text = std::str::from_utf8(text).ok()?.trim_matches(' ');
    if text.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(text, 8).ok()
}

/// Parse a numeric field, accepting GNU base-256 for values that overflow octal
fn parse_numeric(field: &[u8]) -> Option<u64> {
    if field.first().is_some_and(|&b| b & 0x80 != 0) {
        // Base-256: big-endian two's complement with the marker bit cleared.
        // Sizes are never negative, and anything wider than 64 bits is rejected.
        if field[0] & 0x40 != 0 {
            return None;
        }
        let (head, tail) = field.split_at(field.len() - 8);
        if head[0] & 0x3f != 0 || head[1..].iter().any(|&b| b != 0) {
            return None;
        }
        return Some(BigEndian::read_u64(tail));
    }
    parse_octal(field)
}

/// Records of a PAX extended header that affect indexing
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PaxRecords {
    pub path: Option<String>,
    pub size: Option<u64>,
}

impl PaxRecords {
    /// Parse `"<len> <key>=<value>\n"` records
    pub fn parse(data: &[u8]) -> Result<Self, HeaderError> {
        let mut records = PaxRecords::default();
        let mut rest = data;

        while !rest.is_empty() {
            if rest.iter().all(|&b| b == 0) {
                break;
            }
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or("PAX record without length")?;
            let len: usize = std::str::from_utf8(&rest[..space])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or("invalid PAX record length")?;
            if len <= space + 1 || len > rest.len() || rest[len - 1] != b'\n' {
                return Err("malformed PAX record".into());
            }

            let record = &rest[space + 1..len - 1];
            let eq = record
                .iter()
                .position(|&b| b == b'=')
                .ok_or("PAX record without '='")?;
            let value = String::from_utf8_lossy(&record[eq + 1..]).into_owned();
            match &record[..eq] {
                b"path" => records.path = Some(value),
                b"size" => {
                    records.size = Some(value.parse().map_err(|_| "invalid PAX size")?);
                }
                _ => {}
            }

            rest = &rest[len..];
        }

        Ok(records)
    }
}
