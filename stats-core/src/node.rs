use crate::flags::StatFlags;

/// A single leaf stat: a name/value pair with flags and a throttle timestamp.
///
/// `last_reported` only matters for `REGULAR` nodes; it is the wall-clock
/// second of the last broadcast and is reset to `0` whenever the value
/// changes, forcing the next housekeeping pass to re-broadcast immediately.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub value: String,
    pub flags: StatFlags,
    pub last_reported: i64,
}

impl Node {
    pub fn new(name: impl Into<String>, value: impl Into<String>, flags: StatFlags) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            flags,
            last_reported: 0,
        }
    }

    /// Parses `value` as a signed 64-bit decimal, treating anything unparsable as `0`.
    ///
    /// Grounded on `stats.c`'s `INC`/`DEC`/`ADD`/`SUB` handling, which never
    /// fails outright on a non-numeric stat value.
    pub fn as_i64(&self) -> i64 {
        self.value.trim().parse().unwrap_or(0)
    }
}
