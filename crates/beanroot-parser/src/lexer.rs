//! Line tokenizer built on Logos.
//!
//! The ledger grammar is line oriented: a directive header starts in column
//! zero and its postings and metadata follow on indented lines. The parser
//! splits lines itself and hands each one to [`tokenize`].

use logos::Logos;
use std::fmt;

/// Tokens of one source line.
#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t]+")]
pub enum Token<'src> {
    // ===== Literals =====
    /// A date, `YYYY-MM-DD` or `YYYY/MM/DD`.
    #[regex(r"\d{4}[-/]\d{2}[-/]\d{2}")]
    Date(&'src str),

    /// A number with optional sign, thousands separators and decimals.
    #[regex(r"-?(\d{1,3}(,\d{3})*|\d+)(\.\d+)?")]
    Number(&'src str),

    /// A double-quoted string; the slice includes the quotes.
    #[regex(r#""([^"\\]|\\.)*""#)]
    String(&'src str),

    /// An account name with at least two segments.
    #[regex(r"[A-Z][A-Za-z0-9-]*(:[A-Z0-9][A-Za-z0-9-]*)+")]
    Account(&'src str),

    /// A currency code of two or more characters.
    #[regex(r"[A-Z][A-Z0-9'._-]+")]
    Currency(&'src str),

    /// `#tag`
    #[regex(r"#[a-zA-Z0-9-_/.]+")]
    Tag(&'src str),

    /// A `;` comment running to the end of the line.
    #[regex(r";[^\n\r]*")]
    Comment(&'src str),

    /// `^link`
    #[regex(r"\^[a-zA-Z0-9-_/.]+")]
    Link(&'src str),

    /// A metadata key; the slice includes the trailing colon.
    #[regex(r"[a-z][a-zA-Z0-9_-]*:")]
    MetaKey(&'src str),

    // ===== Keywords =====
    /// `txn`
    #[token("txn")]
    Txn,
    /// `balance`
    #[token("balance")]
    Balance,
    /// `open`
    #[token("open")]
    Open,
    /// `close`
    #[token("close")]
    Close,
    /// `commodity`
    #[token("commodity")]
    Commodity,
    /// `pad`
    #[token("pad")]
    Pad,
    /// `event`
    #[token("event")]
    Event,
    /// `query`
    #[token("query")]
    Query,
    /// `note`
    #[token("note")]
    Note,
    /// `document`
    #[token("document")]
    Document,
    /// `price`
    #[token("price")]
    Price,
    /// `custom`
    #[token("custom")]
    Custom,
    /// `option`
    #[token("option")]
    Option_,
    /// `include`
    #[token("include")]
    Include,
    /// `plugin`
    #[token("plugin")]
    Plugin,
    /// `pushtag`
    #[token("pushtag")]
    Pushtag,
    /// `poptag`
    #[token("poptag")]
    Poptag,
    /// `TRUE`
    #[token("TRUE")]
    True,
    /// `FALSE`
    #[token("FALSE")]
    False,

    // ===== Punctuation =====
    /// `{{`
    #[token("{{")]
    LDoubleBrace,
    /// `}}`
    #[token("}}")]
    RDoubleBrace,
    /// `{`
    #[token("{")]
    LBrace,
    /// `}`
    #[token("}")]
    RBrace,
    /// `@@`
    #[token("@@")]
    AtAt,
    /// `@`
    #[token("@")]
    At,
    /// `,`
    #[token(",")]
    Comma,
    /// `~`
    #[token("~")]
    Tilde,

    // ===== Flags =====
    /// `*`
    #[token("*")]
    Star,
    /// `!`
    #[token("!")]
    Pending,
    /// Other single-letter flags.
    #[regex(r"[PSTCURM?%&]")]
    Flag(&'src str),
}

impl Token<'_> {
    /// The flag character, if this token can flag a transaction or posting.
    pub fn flag(&self) -> Option<char> {
        match self {
            Self::Star => Some('*'),
            Self::Pending => Some('!'),
            Self::Flag(s) => s.chars().next(),
            _ => None,
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Date(s)
            | Self::Number(s)
            | Self::String(s)
            | Self::Account(s)
            | Self::Currency(s)
            | Self::Tag(s)
            | Self::Link(s)
            | Self::MetaKey(s)
            | Self::Comment(s)
            | Self::Flag(s) => s,
            Self::Txn => "txn",
            Self::Balance => "balance",
            Self::Open => "open",
            Self::Close => "close",
            Self::Commodity => "commodity",
            Self::Pad => "pad",
            Self::Event => "event",
            Self::Query => "query",
            Self::Note => "note",
            Self::Document => "document",
            Self::Price => "price",
            Self::Custom => "custom",
            Self::Option_ => "option",
            Self::Include => "include",
            Self::Plugin => "plugin",
            Self::Pushtag => "pushtag",
            Self::Poptag => "poptag",
            Self::True => "TRUE",
            Self::False => "FALSE",
            Self::LDoubleBrace => "{{",
            Self::RDoubleBrace => "}}",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::AtAt => "@@",
            Self::At => "@",
            Self::Comma => ",",
            Self::Tilde => "~",
            Self::Star => "*",
            Self::Pending => "!",
        };
        f.write_str(text)
    }
}

/// Tokenize one line, dropping comments. Fails with the offending text on
/// the first unrecognized character.
pub fn tokenize(line: &str) -> Result<Vec<Token<'_>>, String> {
    let mut lexer = Token::lexer(line);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        match result {
            Ok(Token::Comment(_)) => {}
            Ok(token) => tokens.push(token),
            Err(()) => return Err(lexer.slice().to_string()),
        }
    }
    Ok(tokens)
}
