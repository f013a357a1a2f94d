use std::fmt;

/// Size of the on-flash name field, terminator included
pub const CARD_NAME_LEN: usize = 32;

/// Fixed-width, NUL-terminated card holder name
///
/// Holds at most `CARD_NAME_LEN - 1` bytes of text. Longer input is cut at the
/// last UTF-8 boundary that fits, so the stored bytes always decode cleanly.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CardName([u8; CARD_NAME_LEN]);

impl CardName {
    pub const EMPTY: CardName = CardName([0u8; CARD_NAME_LEN]);

    pub fn new(name: &str) -> Self {
        let mut end = name.len().min(CARD_NAME_LEN - 1);
        while !name.is_char_boundary(end) {
            end -= 1;
        }

        let mut bytes = [0u8; CARD_NAME_LEN];
        bytes[..end].copy_from_slice(&name.as_bytes()[..end]);
        CardName(bytes)
    }

    /// Wrap raw bytes read back from flash
    ///
    /// The last byte is forced to NUL, mirroring what `new` guarantees.
    pub fn from_raw(mut bytes: [u8; CARD_NAME_LEN]) -> Self {
        bytes[CARD_NAME_LEN - 1] = 0;
        CardName(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CARD_NAME_LEN] {
        &self.0
    }

    /// Text up to the first NUL; invalid UTF-8 from a foreign image is replaced
    pub fn to_string_lossy(&self) -> String {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(CARD_NAME_LEN);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl Default for CardName {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for CardName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

impl fmt::Display for CardName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

/// One authorization slot of the card table
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CardRecord {
    /// 32-bit card number, `0` marks a never-used slot
    pub id: u32,
    /// Soft-delete flag
    pub active: bool,
    pub name: CardName,
    /// Unix seconds of the last add or successful check, `0` if never
    pub last_seen: u32,
}

impl CardRecord {
    pub const EMPTY: CardRecord = CardRecord {
        id: 0,
        active: false,
        name: CardName::EMPTY,
        last_seen: 0,
    };

    pub fn new(id: u32, name: &str, last_seen: u32) -> Self {
        Self {
            id,
            active: true,
            name: CardName::new(name),
            last_seen,
        }
    }

    /// Whether the slot is counted as a live card
    pub fn is_live(&self) -> bool {
        self.active && self.id != 0
    }

    /// Whether `add` may place a new card here
    pub fn is_reusable(&self) -> bool {
        self.id == 0 || !self.active
    }
}
