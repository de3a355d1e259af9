//! Morse glyph table.
//!
//! Static mapping from the ASCII characters a WinKeyer echoes to their
//! dit/dah element sequences. Pure data, no state, shared read-only.
//!
//! Whitespace has no glyph: the bridge never emits an inter-word gap.

/// Keying element type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Element {
    Dit,
    Dah,
}

impl Element {
    /// Length in dit units (PARIS timing).
    #[inline]
    pub const fn units(self) -> u32 {
        match self {
            Element::Dit => 1,
            Element::Dah => 3,
        }
    }
}

/// Element sequence for one character.
pub type MorseGlyph = &'static [Element];

use Element::{Dah as H, Dit as I};

/// Character table. Prosigns are the keyer's echo substitutes:
/// `<` AR, `>` SK, `[` AS, `]` KN, `\` SN.
static TABLE: &[(char, MorseGlyph)] = &[
    ('A', &[I, H]),
    ('B', &[H, I, I, I]),
    ('C', &[H, I, H, I]),
    ('D', &[H, I, I]),
    ('E', &[I]),
    ('F', &[I, I, H, I]),
    ('G', &[H, H, I]),
    ('H', &[I, I, I, I]),
    ('I', &[I, I]),
    ('J', &[I, H, H, H]),
    ('K', &[H, I, H]),
    ('L', &[I, H, I, I]),
    ('M', &[H, H]),
    ('N', &[H, I]),
    ('O', &[H, H, H]),
    ('P', &[I, H, H, I]),
    ('Q', &[H, H, I, H]),
    ('R', &[I, H, I]),
    ('S', &[I, I, I]),
    ('T', &[H]),
    ('U', &[I, I, H]),
    ('V', &[I, I, I, H]),
    ('W', &[I, H, H]),
    ('X', &[H, I, I, H]),
    ('Y', &[H, I, H, H]),
    ('Z', &[H, H, I, I]),
    ('0', &[H, H, H, H, H]),
    ('1', &[I, H, H, H, H]),
    ('2', &[I, I, H, H, H]),
    ('3', &[I, I, I, H, H]),
    ('4', &[I, I, I, I, H]),
    ('5', &[I, I, I, I, I]),
    ('6', &[H, I, I, I, I]),
    ('7', &[H, H, I, I, I]),
    ('8', &[H, H, H, I, I]),
    ('9', &[H, H, H, H, I]),
    ('.', &[I, H, I, H, I, H]),
    (',', &[H, H, I, I, H, H]),
    ('?', &[I, I, H, H, I, I]),
    ('/', &[H, I, I, H, I]),
    ('=', &[H, I, I, I, H]),
    ('+', &[I, H, I, H, I]),
    ('-', &[H, I, I, I, I, H]),
    ('(', &[H, I, H, H, I]),
    (')', &[H, I, H, H, I, H]),
    ('\'', &[I, H, H, H, H, I]),
    ('"', &[I, H, I, I, H, I]),
    (':', &[H, H, H, I, I, I]),
    (';', &[H, I, H, I, H, I]),
    ('@', &[I, H, H, I, H, I]),
    ('!', &[H, I, H, I, H, H]),
    ('<', &[I, H, I, H, I]),
    ('>', &[I, I, I, H, I, H]),
    ('[', &[I, H, I, I, I]),
    (']', &[H, I, H, H, I]),
    ('\\', &[I, I, I, H, I]),
];

/// Look up the element sequence for a character.
///
/// Case-insensitive. Returns `None` for whitespace and characters
/// without a mapping.
pub fn glyph_for(c: char) -> Option<MorseGlyph> {
    let c = c.to_ascii_uppercase();
    TABLE
        .iter()
        .find(|(ch, _)| *ch == c)
        .map(|(_, glyph)| *glyph)
}

/// All mapped characters, in table order.
pub fn characters() -> impl Iterator<Item = char> {
    TABLE.iter().map(|(c, _)| *c)
}

/// Total keyed length of a glyph in dit units, including the element
/// gaps between elements but not the trailing character gap.
pub fn glyph_units(glyph: MorseGlyph) -> u32 {
    let marks: u32 = glyph.iter().map(|e| e.units()).sum();
    marks + glyph.len().saturating_sub(1) as u32
}

/// Render a glyph as `.`/`-` text, for logs.
pub fn pattern(glyph: MorseGlyph) -> String {
    glyph
        .iter()
        .map(|e| match e {
            Element::Dit => '.',
            Element::Dah => '-',
        })
        .collect()
}
