//! Line-oriented directive parser.
//!
//! A directive header starts in column zero. The indented lines that follow
//! it, up to the next header, are its body: postings and metadata for a
//! transaction, metadata for anything else. Any error inside an entry drops
//! the whole entry and parsing resumes at the next header.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

use beanroot_core::{
    location_meta, Amount, Balance, Close, Commodity, CostSpec, Custom, Directive, Document,
    Event, MetaValue, Metadata, Note, Open, Pad, Posting, Price, PriceAnnotation, Query,
    Transaction,
};

use crate::lexer::{tokenize, Token};
use crate::{ParseError, ParseResult};

struct Line<'s> {
    lineno: u32,
    text: &'s str,
}

impl Line<'_> {
    fn is_blank(&self) -> bool {
        let trimmed = self.text.trim();
        trimmed.is_empty() || trimmed.starts_with(';')
    }

    fn is_indented(&self) -> bool {
        self.text.starts_with([' ', '\t'])
    }
}

struct Cursor<'t, 's> {
    tokens: &'t [Token<'s>],
    pos: usize,
    lineno: u32,
}

impl<'t, 's> Cursor<'t, 's> {
    const fn new(tokens: &'t [Token<'s>], lineno: u32) -> Self {
        Self {
            tokens,
            pos: 0,
            lineno,
        }
    }

    fn peek(&self) -> Option<&Token<'s>> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token<'s>> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token<'_>) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.lineno, message)
    }

    fn unexpected(&self, wanted: &str, got: Option<Token<'_>>) -> ParseError {
        match got {
            Some(token) => self.error(format!("expected {wanted}, found `{token}`")),
            None => self.error(format!("expected {wanted} at end of line")),
        }
    }

    fn account(&mut self) -> Result<String, ParseError> {
        match self.next() {
            Some(Token::Account(a)) => Ok(a.to_string()),
            other => Err(self.unexpected("an account", other)),
        }
    }

    fn string(&mut self) -> Result<String, ParseError> {
        match self.next() {
            Some(Token::String(s)) => Ok(unquote(s)),
            other => Err(self.unexpected("a string", other)),
        }
    }

    fn currency(&mut self) -> Result<String, ParseError> {
        match self.next() {
            Some(Token::Currency(c)) => Ok(c.to_string()),
            other => Err(self.unexpected("a currency", other)),
        }
    }

    fn number(&mut self) -> Result<Decimal, ParseError> {
        match self.next() {
            Some(Token::Number(n)) => {
                parse_number(n).ok_or_else(|| self.error(format!("invalid number {n}")))
            }
            other => Err(self.unexpected("a number", other)),
        }
    }

    fn finish(&self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(format!("unexpected `{token}`"))),
        }
    }
}

fn unquote(raw: &str) -> String {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_number(text: &str) -> Option<Decimal> {
    Decimal::from_str(&text.replace(',', "")).ok()
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&text.replace('/', "-"), "%Y-%m-%d").ok()
}

struct Parser<'f> {
    filename: &'f str,
    result: ParseResult,
    tag_stack: Vec<String>,
}

impl<'f> Parser<'f> {
    fn new(filename: &'f str) -> Self {
        Self {
            filename,
            result: ParseResult::default(),
            tag_stack: Vec::new(),
        }
    }

    fn saw_currency(&mut self, currency: &str) {
        if !self.result.commodities.iter().any(|c| c == currency) {
            self.result.commodities.push(currency.to_string());
        }
    }

    fn entry(&mut self, header: &Line<'_>, body: &[Line<'_>]) -> Result<(), ParseError> {
        let tokens = line_tokens(header)?;
        let mut cur = Cursor::new(&tokens, header.lineno);
        match cur.next() {
            Some(Token::Option_) => {
                let key = cur.string()?;
                let value = cur.string()?;
                cur.finish()?;
                self.result.options.push((key, value, header.lineno));
            }
            Some(Token::Include) => {
                let path = cur.string()?;
                cur.finish()?;
                self.result.includes.push((path, header.lineno));
            }
            Some(Token::Plugin) => {
                let name = cur.string()?;
                let config = match cur.peek() {
                    Some(Token::String(_)) => Some(cur.string()?),
                    _ => None,
                };
                cur.finish()?;
                self.result.plugins.push((name, config, header.lineno));
            }
            Some(Token::Pushtag) => {
                let tag = tag_of(&mut cur)?;
                cur.finish()?;
                self.tag_stack.push(tag);
            }
            Some(Token::Poptag) => {
                let tag = tag_of(&mut cur)?;
                cur.finish()?;
                match self.tag_stack.iter().rposition(|t| *t == tag) {
                    Some(index) => {
                        self.tag_stack.remove(index);
                    }
                    None => return Err(cur.error(format!("poptag of unpushed tag #{tag}"))),
                }
            }
            Some(Token::Date(text)) => {
                let date =
                    parse_date(text).ok_or_else(|| cur.error(format!("invalid date {text}")))?;
                let directive = self.dated(date, &mut cur, body)?;
                self.result.directives.push(directive);
            }
            other => return Err(cur.unexpected("a directive", other)),
        }
        Ok(())
    }

    fn dated(
        &mut self,
        date: NaiveDate,
        cur: &mut Cursor<'_, '_>,
        body: &[Line<'_>],
    ) -> Result<Directive, ParseError> {
        let mut meta = location_meta(self.filename, cur.lineno);
        let keyword = cur.next();
        let mut directive = match keyword {
            Some(Token::Txn) => return self.transaction(date, '*', cur, body, meta),
            Some(ref token) if token.flag().is_some() => {
                let flag = token.flag().unwrap_or('*');
                return self.transaction(date, flag, cur, body, meta);
            }
            Some(Token::Open) => {
                let account = cur.account()?;
                let mut currencies = Vec::new();
                while let Some(Token::Currency(_)) = cur.peek() {
                    let currency = cur.currency()?;
                    self.saw_currency(&currency);
                    currencies.push(currency);
                    cur.eat(&Token::Comma);
                }
                let booking = match cur.peek() {
                    Some(Token::String(_)) => Some(cur.string()?),
                    _ => None,
                };
                Directive::Open(Open {
                    date,
                    account,
                    currencies,
                    booking,
                    meta: Metadata::new(),
                })
            }
            Some(Token::Close) => Directive::Close(Close {
                date,
                account: cur.account()?,
                meta: Metadata::new(),
            }),
            Some(Token::Commodity) => {
                let currency = cur.currency()?;
                self.saw_currency(&currency);
                Directive::Commodity(Commodity {
                    date,
                    currency,
                    meta: Metadata::new(),
                })
            }
            Some(Token::Pad) => Directive::Pad(Pad {
                date,
                account: cur.account()?,
                source_account: cur.account()?,
                meta: Metadata::new(),
            }),
            Some(Token::Balance) => {
                let account = cur.account()?;
                let number = cur.number()?;
                let mut tolerance = None;
                if cur.eat(&Token::Tilde) {
                    tolerance = Some(cur.number()?);
                }
                let currency = cur.currency()?;
                if tolerance.is_none() && cur.eat(&Token::Tilde) {
                    tolerance = Some(cur.number()?);
                }
                self.saw_currency(&currency);
                Directive::Balance(Balance {
                    date,
                    account,
                    amount: Amount::new(number, currency),
                    tolerance,
                    meta: Metadata::new(),
                })
            }
            Some(Token::Note) => Directive::Note(Note {
                date,
                account: cur.account()?,
                comment: cur.string()?,
                meta: Metadata::new(),
            }),
            Some(Token::Document) => Directive::Document(Document {
                date,
                account: cur.account()?,
                path: cur.string()?,
                meta: Metadata::new(),
            }),
            Some(Token::Price) => {
                let currency = cur.currency()?;
                let amount = self.amount(cur)?;
                self.saw_currency(&currency);
                Directive::Price(Price {
                    date,
                    currency,
                    amount,
                    meta: Metadata::new(),
                })
            }
            Some(Token::Event) => Directive::Event(Event {
                date,
                event_type: cur.string()?,
                value: cur.string()?,
                meta: Metadata::new(),
            }),
            Some(Token::Query) => Directive::Query(Query {
                date,
                name: cur.string()?,
                query: cur.string()?,
                meta: Metadata::new(),
            }),
            Some(Token::Custom) => {
                let custom_type = cur.string()?;
                let mut values = Vec::new();
                while cur.peek().is_some() {
                    values.push(self.meta_value(cur)?);
                }
                Directive::Custom(Custom {
                    date,
                    custom_type,
                    values,
                    meta: Metadata::new(),
                })
            }
            other => return Err(cur.unexpected("a directive keyword", other)),
        };
        cur.finish()?;
        for line in body {
            let tokens = line_tokens(line)?;
            if tokens.is_empty() {
                continue;
            }
            let mut body_cur = Cursor::new(&tokens, line.lineno);
            let (key, value) = self.meta_entry(&mut body_cur)?;
            meta.insert(key, value);
        }
        *directive.meta_mut() = meta;
        Ok(directive)
    }

    fn transaction(
        &mut self,
        date: NaiveDate,
        flag: char,
        cur: &mut Cursor<'_, '_>,
        body: &[Line<'_>],
        meta: Metadata,
    ) -> Result<Directive, ParseError> {
        let mut strings = Vec::new();
        while let Some(Token::String(_)) = cur.peek() {
            strings.push(cur.string()?);
        }
        let (payee, narration) = match strings.len() {
            0 => (None, String::new()),
            1 => (None, strings.remove(0)),
            2 => {
                let narration = strings.remove(1);
                (Some(strings.remove(0)), narration)
            }
            _ => return Err(cur.error("too many strings in transaction header")),
        };
        let mut txn = Transaction::new(date, narration).with_flag(flag);
        txn.payee = payee;
        txn.meta = meta;
        loop {
            match cur.next() {
                Some(Token::Tag(t)) => txn.tags.push(t[1..].to_string()),
                Some(Token::Link(l)) => txn.links.push(l[1..].to_string()),
                None => break,
                other => return Err(cur.unexpected("a tag or link", other)),
            }
        }
        for tag in &self.tag_stack {
            if !txn.tags.contains(tag) {
                txn.tags.push(tag.clone());
            }
        }

        for line in body {
            let tokens = line_tokens(line)?;
            if tokens.is_empty() {
                continue;
            }
            let mut body_cur = Cursor::new(&tokens, line.lineno);
            if let Some(Token::MetaKey(_)) = body_cur.peek() {
                let (key, value) = self.meta_entry(&mut body_cur)?;
                match txn.postings.last_mut() {
                    Some(posting) => posting.meta.insert(key, value),
                    None => txn.meta.insert(key, value),
                };
            } else {
                let posting = self.posting(&mut body_cur)?;
                txn.postings.push(posting);
            }
        }
        Ok(Directive::Transaction(txn))
    }

    fn posting(&mut self, cur: &mut Cursor<'_, '_>) -> Result<Posting, ParseError> {
        let flag = cur.peek().and_then(Token::flag);
        if flag.is_some() {
            cur.next();
        }
        let account = cur.account()?;
        let mut posting = Posting::auto(account);
        posting.flag = flag;
        if let Some(Token::Number(_)) = cur.peek() {
            posting.units = Some(self.amount(cur)?);
        }
        match cur.peek() {
            Some(Token::LBrace) => {
                cur.next();
                posting.cost = Some(self.cost_spec(cur, false)?);
            }
            Some(Token::LDoubleBrace) => {
                cur.next();
                posting.cost = Some(self.cost_spec(cur, true)?);
            }
            _ => {}
        }
        if cur.eat(&Token::At) {
            posting.price = Some(PriceAnnotation::Unit(self.amount(cur)?));
        } else if cur.eat(&Token::AtAt) {
            posting.price = Some(PriceAnnotation::Total(self.amount(cur)?));
        }
        cur.finish()?;
        if posting.units.is_none() && (posting.cost.is_some() || posting.price.is_some()) {
            return Err(cur.error("a cost or price requires units"));
        }
        Ok(posting)
    }

    fn cost_spec(&mut self, cur: &mut Cursor<'_, '_>, total: bool) -> Result<CostSpec, ParseError> {
        let close = if total {
            Token::RDoubleBrace
        } else {
            Token::RBrace
        };
        let mut spec = CostSpec::empty();
        loop {
            match cur.next() {
                Some(ref t) if *t == close => return Ok(spec),
                Some(Token::Comma) => {}
                Some(Token::Number(n)) => {
                    let number =
                        parse_number(n).ok_or_else(|| cur.error(format!("invalid number {n}")))?;
                    if total {
                        spec.number_total = Some(number);
                    } else {
                        spec.number_per = Some(number);
                    }
                }
                Some(Token::Currency(c)) => {
                    self.saw_currency(c);
                    spec.currency = Some(c.to_string());
                }
                Some(Token::Date(d)) => {
                    spec.date =
                        Some(parse_date(d).ok_or_else(|| cur.error(format!("invalid date {d}")))?);
                }
                Some(Token::String(s)) => spec.label = Some(unquote(s)),
                other => return Err(cur.unexpected("a cost component", other)),
            }
        }
    }

    fn amount(&mut self, cur: &mut Cursor<'_, '_>) -> Result<Amount, ParseError> {
        let number = cur.number()?;
        let currency = cur.currency()?;
        self.saw_currency(&currency);
        Ok(Amount::new(number, currency))
    }

    fn meta_entry(&mut self, cur: &mut Cursor<'_, '_>) -> Result<(String, MetaValue), ParseError> {
        let key = match cur.next() {
            Some(Token::MetaKey(k)) => k.trim_end_matches(':').to_string(),
            other => return Err(cur.unexpected("a metadata key", other)),
        };
        let value = if cur.peek().is_some() {
            self.meta_value(cur)?
        } else {
            MetaValue::None
        };
        cur.finish()?;
        Ok((key, value))
    }

    fn meta_value(&mut self, cur: &mut Cursor<'_, '_>) -> Result<MetaValue, ParseError> {
        Ok(match cur.next() {
            Some(Token::String(s)) => MetaValue::String(unquote(s)),
            Some(Token::Account(a)) => MetaValue::Account(a.to_string()),
            Some(Token::Currency(c)) => MetaValue::Currency(c.to_string()),
            Some(Token::Tag(t)) => MetaValue::Tag(t[1..].to_string()),
            Some(Token::True) => MetaValue::Bool(true),
            Some(Token::False) => MetaValue::Bool(false),
            Some(Token::Date(d)) => MetaValue::Date(
                parse_date(d).ok_or_else(|| cur.error(format!("invalid date {d}")))?,
            ),
            Some(Token::Number(n)) => {
                let number =
                    parse_number(n).ok_or_else(|| cur.error(format!("invalid number {n}")))?;
                match cur.peek() {
                    Some(Token::Currency(_)) => {
                        let currency = cur.currency()?;
                        MetaValue::Amount(Amount::new(number, currency))
                    }
                    _ => MetaValue::Number(number),
                }
            }
            other => return Err(cur.unexpected("a value", other)),
        })
    }
}

fn tag_of(cur: &mut Cursor<'_, '_>) -> Result<String, ParseError> {
    match cur.next() {
        Some(Token::Tag(t)) => Ok(t[1..].to_string()),
        other => Err(cur.unexpected("a tag", other)),
    }
}

fn line_tokens<'s>(line: &Line<'s>) -> Result<Vec<Token<'s>>, ParseError> {
    tokenize(line.text)
        .map_err(|bad| ParseError::new(line.lineno, format!("unexpected character `{bad}`")))
}

/// Parse `source`, tagging every directive with `filename`.
pub fn parse(source: &str, filename: &str) -> ParseResult {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let lines: Vec<Line<'_>> = source
        .lines()
        .enumerate()
        .map(|(i, text)| Line {
            lineno: u32::try_from(i + 1).unwrap_or(u32::MAX),
            text,
        })
        .collect();

    let mut parser = Parser::new(filename);
    let mut i = 0;
    while i < lines.len() {
        let header = &lines[i];
        i += 1;
        if header.is_blank() || header.text.starts_with('*') {
            continue;
        }
        let start = i;
        while i < lines.len() && (lines[i].is_indented() || lines[i].is_blank()) {
            i += 1;
        }
        if header.is_indented() {
            parser
                .result
                .errors
                .push(ParseError::new(header.lineno, "unexpected indentation"));
            continue;
        }
        if let Err(err) = parser.entry(header, &lines[start..i]) {
            parser.result.errors.push(err);
        }
    }
    for tag in std::mem::take(&mut parser.tag_stack) {
        let lineno = u32::try_from(lines.len()).unwrap_or(u32::MAX);
        parser
            .result
            .errors
            .push(ParseError::new(lineno, format!("unbalanced pushtag #{tag}")));
    }
    parser.result
}
