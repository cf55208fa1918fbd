//! Token identities for the rill front-end.
//!
//! The lexer interns every lexeme into a [`Map`], handing out stable
//! [`ID`]s. An `ID` packs a small canonical [`Key`] (used for match
//! dispatch) together with category flags, so the checker can classify a
//! token without consulting the map. The built-in vocabulary (keywords,
//! primitive type names, operators) is seeded with fixed keys; everything
//! else (identifiers, literals) gets a key past [`DYNAMIC_BASE`].
//!
//! Operators come in two forms. The ambiguous form is what the lexer
//! produces (`-` could be unary or binary); the parser rewrites each
//! operator to its disambiguated `X_*` form before the AST reaches the
//! checker. [`ID::ambiguous_form`] maps back for diagnostics.

use std::collections::HashMap;

use bitflags::bitflags;
use thiserror::Error;

/// Number of low bits of an [`ID`] that carry its category flags. The
/// remaining high bits carry the [`Key`].
pub const KEY_SHIFT: u32 = 8;

const FLAGS_MASK: u32 = (1 << KEY_SHIFT) - 1;
const MAX_KEY: u32 = u32::MAX >> KEY_SHIFT;

bitflags! {
    /// Category flags carried by every token [`ID`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TokenFlags: u32 {
        const IDENT          = 1 << 0;
        const NUM_LITERAL    = 1 << 1;
        const STR_LITERAL    = 1 << 2;
        const NUM_TYPE       = 1 << 3;
        const UNARY_OP       = 1 << 4;
        const BINARY_OP      = 1 << 5;
        const ASSOCIATIVE_OP = 1 << 6;
    }
}

/// The canonical small-int form of a token, used in match dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Key(pub u32);

/// First key handed out to dynamically interned lexemes.
pub const DYNAMIC_BASE: Key = Key(0x100);

impl Key {
    pub const NIL: Key = Key(0x00);

    // Keywords.
    pub const ASSERT: Key = Key(0x01);
    pub const PRE: Key = Key(0x02);
    pub const INV: Key = Key(0x03);
    pub const POST: Key = Key(0x04);
    pub const BREAK: Key = Key(0x05);
    pub const CONTINUE: Key = Key(0x06);
    pub const ELSE: Key = Key(0x07);
    pub const FUNC: Key = Key(0x08);
    pub const IF: Key = Key(0x09);
    pub const PRI: Key = Key(0x0A);
    pub const PUB: Key = Key(0x0B);
    pub const PTR: Key = Key(0x0C);
    pub const RETURN: Key = Key(0x0D);
    pub const STRUCT: Key = Key(0x0E);
    pub const USE: Key = Key(0x0F);
    pub const VAR: Key = Key(0x10);
    pub const WHILE: Key = Key(0x11);
    pub const IN: Key = Key(0x12);
    pub const OUT: Key = Key(0x13);
    pub const THIS: Key = Key(0x14);
    pub const UNDERSCORE: Key = Key(0x15);
    pub const TRUE: Key = Key(0x16);
    pub const FALSE: Key = Key(0x17);
    /// The pseudo-type of untyped numeric literals. Flagged as a numeric
    /// type so it unifies through the same predicates as sized integers,
    /// but rejected by name in type expressions so it stays internal.
    pub const IDEAL: Key = Key(0x18);

    // Built-in type names.
    pub const BOOL: Key = Key(0x20);
    pub const BUF1: Key = Key(0x21);
    pub const I8: Key = Key(0x22);
    pub const I16: Key = Key(0x23);
    pub const I32: Key = Key(0x24);
    pub const I64: Key = Key(0x25);
    pub const U8: Key = Key(0x26);
    pub const U16: Key = Key(0x27);
    pub const U32: Key = Key(0x28);
    pub const U64: Key = Key(0x29);

    // Built-in identifiers the checker recognizes by key.
    pub const READ_U8: Key = Key(0x30);
    pub const SRC: Key = Key(0x31);
    pub const LOW_BITS: Key = Key(0x32);

    // Punctuation.
    pub const OPEN_PAREN: Key = Key(0x38);
    pub const CLOSE_PAREN: Key = Key(0x39);
    pub const OPEN_BRACKET: Key = Key(0x3A);
    pub const CLOSE_BRACKET: Key = Key(0x3B);
    pub const OPEN_BRACE: Key = Key(0x3C);
    pub const CLOSE_BRACE: Key = Key(0x3D);
    pub const COLON: Key = Key(0x3E);
    pub const SEMICOLON: Key = Key(0x3F);
    pub const COMMA: Key = Key(0x40);
    pub const DOT: Key = Key(0x41);

    // Assignment operators.
    pub const EQ: Key = Key(0x50);
    pub const PLUS_EQ: Key = Key(0x51);
    pub const MINUS_EQ: Key = Key(0x52);
    pub const STAR_EQ: Key = Key(0x53);
    pub const SLASH_EQ: Key = Key(0x54);
    pub const AMP_EQ: Key = Key(0x55);
    pub const AMP_HAT_EQ: Key = Key(0x56);
    pub const PIPE_EQ: Key = Key(0x57);
    pub const HAT_EQ: Key = Key(0x58);
    pub const SHIFT_L_EQ: Key = Key(0x59);
    pub const SHIFT_R_EQ: Key = Key(0x5A);

    // Operators, ambiguous form (as lexed).
    pub const PLUS: Key = Key(0x60);
    pub const MINUS: Key = Key(0x61);
    pub const STAR: Key = Key(0x62);
    pub const SLASH: Key = Key(0x63);
    pub const AMP: Key = Key(0x64);
    pub const AMP_HAT: Key = Key(0x65);
    pub const PIPE: Key = Key(0x66);
    pub const HAT: Key = Key(0x67);
    pub const SHIFT_L: Key = Key(0x68);
    pub const SHIFT_R: Key = Key(0x69);
    pub const NOT_EQ: Key = Key(0x6A);
    pub const LESS_THAN: Key = Key(0x6B);
    pub const LESS_EQ: Key = Key(0x6C);
    pub const EQ_EQ: Key = Key(0x6D);
    pub const GREATER_EQ: Key = Key(0x6E);
    pub const GREATER_THAN: Key = Key(0x6F);
    pub const AND: Key = Key(0x70);
    pub const OR: Key = Key(0x71);
    pub const NOT: Key = Key(0x72);
    pub const AS: Key = Key(0x73);

    // Operators, disambiguated form (as parsed).
    pub const X_UNARY_PLUS: Key = Key(0x80);
    pub const X_UNARY_MINUS: Key = Key(0x81);
    pub const X_UNARY_NOT: Key = Key(0x82);

    pub const X_BINARY_PLUS: Key = Key(0x90);
    pub const X_BINARY_MINUS: Key = Key(0x91);
    pub const X_BINARY_STAR: Key = Key(0x92);
    pub const X_BINARY_SLASH: Key = Key(0x93);
    pub const X_BINARY_SHIFT_L: Key = Key(0x94);
    pub const X_BINARY_SHIFT_R: Key = Key(0x95);
    pub const X_BINARY_AMP: Key = Key(0x96);
    pub const X_BINARY_AMP_HAT: Key = Key(0x97);
    pub const X_BINARY_PIPE: Key = Key(0x98);
    pub const X_BINARY_HAT: Key = Key(0x99);
    pub const X_BINARY_NOT_EQ: Key = Key(0x9A);
    pub const X_BINARY_LESS_THAN: Key = Key(0x9B);
    pub const X_BINARY_LESS_EQ: Key = Key(0x9C);
    pub const X_BINARY_EQ_EQ: Key = Key(0x9D);
    pub const X_BINARY_GREATER_EQ: Key = Key(0x9E);
    pub const X_BINARY_GREATER_THAN: Key = Key(0x9F);
    pub const X_BINARY_AND: Key = Key(0xA0);
    pub const X_BINARY_OR: Key = Key(0xA1);
    pub const X_BINARY_AS: Key = Key(0xA2);

    pub const X_ASSOCIATIVE_PLUS: Key = Key(0xB0);
    pub const X_ASSOCIATIVE_STAR: Key = Key(0xB1);
    pub const X_ASSOCIATIVE_AMP: Key = Key(0xB2);
    pub const X_ASSOCIATIVE_PIPE: Key = Key(0xB3);
    pub const X_ASSOCIATIVE_HAT: Key = Key(0xB4);
    pub const X_ASSOCIATIVE_AND: Key = Key(0xB5);
    pub const X_ASSOCIATIVE_OR: Key = Key(0xB6);
}

/// A stable identifier for an interned lexeme: `key << KEY_SHIFT | flags`.
///
/// `ID::default()` (all zero) is the absent id: no label, no receiver, the
/// operator slot of a leaf expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ID(u32);

impl ID {
    pub const fn pack(key: Key, flags: TokenFlags) -> ID {
        ID((key.0 << KEY_SHIFT) | flags.bits())
    }

    /// The id of a built-in key, with that key's seeded flags.
    pub fn from_key(key: Key) -> ID {
        match BUILT_INS.iter().find(|&&(k, _, _)| k == key) {
            Some(&(_, _, flags)) => ID::pack(key, flags),
            None => ID::pack(key, TokenFlags::empty()),
        }
    }

    pub fn is_nil(self) -> bool {
        self.0 == 0
    }

    pub fn key(self) -> Key {
        Key(self.0 >> KEY_SHIFT)
    }

    pub fn flags(self) -> TokenFlags {
        TokenFlags::from_bits_truncate(self.0 & FLAGS_MASK)
    }

    pub fn is_ident(self) -> bool {
        self.flags().contains(TokenFlags::IDENT)
    }

    pub fn is_num_literal(self) -> bool {
        self.flags().contains(TokenFlags::NUM_LITERAL)
    }

    pub fn is_str_literal(self) -> bool {
        self.flags().contains(TokenFlags::STR_LITERAL)
    }

    pub fn is_num_type(self) -> bool {
        self.flags().contains(TokenFlags::NUM_TYPE)
    }

    pub fn is_unary_op(self) -> bool {
        self.flags().contains(TokenFlags::UNARY_OP)
    }

    pub fn is_binary_op(self) -> bool {
        self.flags().contains(TokenFlags::BINARY_OP)
    }

    pub fn is_associative_op(self) -> bool {
        self.flags().contains(TokenFlags::ASSOCIATIVE_OP)
    }

    /// Maps a disambiguated operator back to its source form, for
    /// diagnostics. Identity for everything else.
    pub fn ambiguous_form(self) -> ID {
        let key = match self.key() {
            Key::X_UNARY_PLUS => Key::PLUS,
            Key::X_UNARY_MINUS => Key::MINUS,
            Key::X_UNARY_NOT => Key::NOT,
            Key::X_BINARY_PLUS => Key::PLUS,
            Key::X_BINARY_MINUS => Key::MINUS,
            Key::X_BINARY_STAR => Key::STAR,
            Key::X_BINARY_SLASH => Key::SLASH,
            Key::X_BINARY_SHIFT_L => Key::SHIFT_L,
            Key::X_BINARY_SHIFT_R => Key::SHIFT_R,
            Key::X_BINARY_AMP => Key::AMP,
            Key::X_BINARY_AMP_HAT => Key::AMP_HAT,
            Key::X_BINARY_PIPE => Key::PIPE,
            Key::X_BINARY_HAT => Key::HAT,
            Key::X_BINARY_NOT_EQ => Key::NOT_EQ,
            Key::X_BINARY_LESS_THAN => Key::LESS_THAN,
            Key::X_BINARY_LESS_EQ => Key::LESS_EQ,
            Key::X_BINARY_EQ_EQ => Key::EQ_EQ,
            Key::X_BINARY_GREATER_EQ => Key::GREATER_EQ,
            Key::X_BINARY_GREATER_THAN => Key::GREATER_THAN,
            Key::X_BINARY_AND => Key::AND,
            Key::X_BINARY_OR => Key::OR,
            Key::X_BINARY_AS => Key::AS,
            Key::X_ASSOCIATIVE_PLUS => Key::PLUS,
            Key::X_ASSOCIATIVE_STAR => Key::STAR,
            Key::X_ASSOCIATIVE_AMP => Key::AMP,
            Key::X_ASSOCIATIVE_PIPE => Key::PIPE,
            Key::X_ASSOCIATIVE_HAT => Key::HAT,
            Key::X_ASSOCIATIVE_AND => Key::AND,
            Key::X_ASSOCIATIVE_OR => Key::OR,
            _ => return self,
        };
        ID::from_key(key)
    }

    /// The source spelling of this id, for diagnostics. Empty for the nil
    /// id and for ids this map never produced.
    pub fn str<'m>(self, tm: &'m Map) -> &'m str {
        tm.name(self)
    }
}

const IDENT: TokenFlags = TokenFlags::IDENT;
const NUM_TYPE: TokenFlags = TokenFlags::NUM_TYPE;
const UNARY: TokenFlags = TokenFlags::UNARY_OP;
const BINARY: TokenFlags = TokenFlags::BINARY_OP;
const ASSOC: TokenFlags = TokenFlags::ASSOCIATIVE_OP;
const NONE: TokenFlags = TokenFlags::empty();

/// Seed vocabulary: `(key, spelling, flags)`. Where several keys share a
/// spelling (ambiguous vs disambiguated operators), the first entry wins
/// in the name table; the lexer only ever produces the ambiguous form.
const BUILT_INS: &[(Key, &str, TokenFlags)] = &[
    (Key::ASSERT, "assert", NONE),
    (Key::PRE, "pre", NONE),
    (Key::INV, "inv", NONE),
    (Key::POST, "post", NONE),
    (Key::BREAK, "break", NONE),
    (Key::CONTINUE, "continue", NONE),
    (Key::ELSE, "else", NONE),
    (Key::FUNC, "func", NONE),
    (Key::IF, "if", NONE),
    (Key::PRI, "pri", NONE),
    (Key::PUB, "pub", NONE),
    (Key::PTR, "ptr", NONE),
    (Key::RETURN, "return", NONE),
    (Key::STRUCT, "struct", NONE),
    (Key::USE, "use", NONE),
    (Key::VAR, "var", NONE),
    (Key::WHILE, "while", NONE),
    // in and out double as the implicit parameter-struct locals, so the
    // identifier lookup path must accept them.
    (Key::IN, "in", IDENT),
    (Key::OUT, "out", IDENT),
    (Key::THIS, "this", NONE),
    (Key::UNDERSCORE, "_", NONE),
    (Key::TRUE, "true", NONE),
    (Key::FALSE, "false", NONE),
    (Key::IDEAL, "ideal", NUM_TYPE),
    (Key::BOOL, "bool", NONE),
    (Key::BUF1, "buf1", NONE),
    (Key::I8, "i8", NUM_TYPE),
    (Key::I16, "i16", NUM_TYPE),
    (Key::I32, "i32", NUM_TYPE),
    (Key::I64, "i64", NUM_TYPE),
    (Key::U8, "u8", NUM_TYPE),
    (Key::U16, "u16", NUM_TYPE),
    (Key::U32, "u32", NUM_TYPE),
    (Key::U64, "u64", NUM_TYPE),
    (Key::READ_U8, "read_u8", IDENT),
    (Key::SRC, "src", IDENT),
    (Key::LOW_BITS, "low_bits", IDENT),
    (Key::OPEN_PAREN, "(", NONE),
    (Key::CLOSE_PAREN, ")", NONE),
    (Key::OPEN_BRACKET, "[", NONE),
    (Key::CLOSE_BRACKET, "]", NONE),
    (Key::OPEN_BRACE, "{", NONE),
    (Key::CLOSE_BRACE, "}", NONE),
    (Key::COLON, ":", NONE),
    (Key::SEMICOLON, ";", NONE),
    (Key::COMMA, ",", NONE),
    (Key::DOT, ".", NONE),
    (Key::EQ, "=", NONE),
    (Key::PLUS_EQ, "+=", NONE),
    (Key::MINUS_EQ, "-=", NONE),
    (Key::STAR_EQ, "*=", NONE),
    (Key::SLASH_EQ, "/=", NONE),
    (Key::AMP_EQ, "&=", NONE),
    (Key::AMP_HAT_EQ, "&^=", NONE),
    (Key::PIPE_EQ, "|=", NONE),
    (Key::HAT_EQ, "^=", NONE),
    (Key::SHIFT_L_EQ, "<<=", NONE),
    (Key::SHIFT_R_EQ, ">>=", NONE),
    (Key::PLUS, "+", NONE),
    (Key::MINUS, "-", NONE),
    (Key::STAR, "*", NONE),
    (Key::SLASH, "/", NONE),
    (Key::AMP, "&", NONE),
    (Key::AMP_HAT, "&^", NONE),
    (Key::PIPE, "|", NONE),
    (Key::HAT, "^", NONE),
    (Key::SHIFT_L, "<<", NONE),
    (Key::SHIFT_R, ">>", NONE),
    (Key::NOT_EQ, "!=", NONE),
    (Key::LESS_THAN, "<", NONE),
    (Key::LESS_EQ, "<=", NONE),
    (Key::EQ_EQ, "==", NONE),
    (Key::GREATER_EQ, ">=", NONE),
    (Key::GREATER_THAN, ">", NONE),
    (Key::AND, "and", NONE),
    (Key::OR, "or", NONE),
    (Key::NOT, "not", NONE),
    (Key::AS, "as", NONE),
    (Key::X_UNARY_PLUS, "+", UNARY),
    (Key::X_UNARY_MINUS, "-", UNARY),
    (Key::X_UNARY_NOT, "not", UNARY),
    (Key::X_BINARY_PLUS, "+", BINARY),
    (Key::X_BINARY_MINUS, "-", BINARY),
    (Key::X_BINARY_STAR, "*", BINARY),
    (Key::X_BINARY_SLASH, "/", BINARY),
    (Key::X_BINARY_SHIFT_L, "<<", BINARY),
    (Key::X_BINARY_SHIFT_R, ">>", BINARY),
    (Key::X_BINARY_AMP, "&", BINARY),
    (Key::X_BINARY_AMP_HAT, "&^", BINARY),
    (Key::X_BINARY_PIPE, "|", BINARY),
    (Key::X_BINARY_HAT, "^", BINARY),
    (Key::X_BINARY_NOT_EQ, "!=", BINARY),
    (Key::X_BINARY_LESS_THAN, "<", BINARY),
    (Key::X_BINARY_LESS_EQ, "<=", BINARY),
    (Key::X_BINARY_EQ_EQ, "==", BINARY),
    (Key::X_BINARY_GREATER_EQ, ">=", BINARY),
    (Key::X_BINARY_GREATER_THAN, ">", BINARY),
    (Key::X_BINARY_AND, "and", BINARY),
    (Key::X_BINARY_OR, "or", BINARY),
    (Key::X_BINARY_AS, "as", BINARY),
    (Key::X_ASSOCIATIVE_PLUS, "+", ASSOC),
    (Key::X_ASSOCIATIVE_STAR, "*", ASSOC),
    (Key::X_ASSOCIATIVE_AMP, "&", ASSOC),
    (Key::X_ASSOCIATIVE_PIPE, "|", ASSOC),
    (Key::X_ASSOCIATIVE_HAT, "^", ASSOC),
    (Key::X_ASSOCIATIVE_AND, "and", ASSOC),
    (Key::X_ASSOCIATIVE_OR, "or", ASSOC),
];

/// The interner has exhausted its key space.
#[derive(Debug, Error)]
#[error("token map has no more room for new tokens")]
pub struct MapFullError;

/// The token map: lexeme string to [`ID`] and back.
#[derive(Debug)]
pub struct Map {
    by_name: HashMap<String, ID>,
    names: Vec<String>,
}

impl Default for Map {
    fn default() -> Self {
        let mut by_name = HashMap::with_capacity(BUILT_INS.len());
        for &(key, name, flags) in BUILT_INS {
            by_name.entry(name.to_string()).or_insert(ID::pack(key, flags));
        }
        Map {
            by_name,
            names: Vec::new(),
        }
    }
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a lexeme, returning its stable id. New lexemes are
    /// classified by their leading character: a digit means a numeric
    /// literal, a double quote a string literal, anything else an
    /// identifier.
    pub fn insert(&mut self, name: &str) -> Result<ID, MapFullError> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }
        let key = DYNAMIC_BASE.0 + self.names.len() as u32;
        if key > MAX_KEY {
            return Err(MapFullError);
        }
        let id = ID::pack(Key(key), classify(name));
        self.by_name.insert(name.to_string(), id);
        self.names.push(name.to_string());
        Ok(id)
    }

    /// Looks up a lexeme without interning it. Returns the nil id if the
    /// lexeme has never been seen.
    pub fn by_name(&self, name: &str) -> ID {
        self.by_name.get(name).copied().unwrap_or_default()
    }

    fn name(&self, id: ID) -> &str {
        let key = id.key();
        if key >= DYNAMIC_BASE {
            let i = (key.0 - DYNAMIC_BASE.0) as usize;
            return self.names.get(i).map(String::as_str).unwrap_or("");
        }
        builtin_name(key).unwrap_or("")
    }
}

fn classify(name: &str) -> TokenFlags {
    match name.as_bytes().first() {
        Some(b'0'..=b'9') => TokenFlags::NUM_LITERAL,
        Some(b'"') => TokenFlags::STR_LITERAL,
        _ => TokenFlags::IDENT,
    }
}

fn builtin_name(key: Key) -> Option<&'static str> {
    BUILT_INS
        .iter()
        .find(|&&(k, _, _)| k == key)
        .map(|&(_, name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup() {
        let tm = Map::new();
        assert_eq!(tm.by_name("u32").key(), Key::U32);
        assert!(tm.by_name("u32").is_num_type());
        assert_eq!(tm.by_name("while").key(), Key::WHILE);
        assert!(tm.by_name("no_such_lexeme").is_nil());
    }

    #[test]
    fn interning_is_stable_and_classified() {
        let mut tm = Map::new();
        let foo = tm.insert("foo").unwrap();
        assert_eq!(tm.insert("foo").unwrap(), foo);
        assert!(foo.is_ident());
        assert!(foo.key() >= DYNAMIC_BASE);
        assert_eq!(foo.str(&tm), "foo");

        let lit = tm.insert("0x42").unwrap();
        assert!(lit.is_num_literal());
        assert!(!lit.is_ident());

        let s = tm.insert("\"reason\"").unwrap();
        assert!(s.is_str_literal());
    }

    #[test]
    fn interning_keywords_returns_builtins() {
        let mut tm = Map::new();
        let id = tm.insert("break").unwrap();
        assert_eq!(id.key(), Key::BREAK);
        assert!(!id.is_ident());
    }

    #[test]
    fn operator_flags_and_ambiguous_form() {
        let minus = ID::from_key(Key::X_BINARY_MINUS);
        assert!(minus.is_binary_op());
        assert!(!minus.is_unary_op());
        assert_eq!(minus.ambiguous_form().key(), Key::MINUS);

        let tm = Map::new();
        assert_eq!(minus.ambiguous_form().str(&tm), "-");

        let ident = ID::from_key(Key::SRC);
        assert_eq!(ident.ambiguous_form(), ident);
    }

    #[test]
    fn in_and_out_are_idents() {
        let tm = Map::new();
        assert!(tm.by_name("in").is_ident());
        assert!(tm.by_name("out").is_ident());
        assert_eq!(tm.by_name("in").key(), Key::IN);
    }

    #[test]
    fn ideal_is_a_num_type() {
        assert!(ID::from_key(Key::IDEAL).is_num_type());
    }
}
