//! Directives: the dated statements a ledger is made of.
//!
//! Every directive carries a date and a metadata map. The source location a
//! directive came from is stored in its metadata under `filename` and
//! `lineno`, so it survives every transformation that copies metadata along.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Amount, ArithmeticOverflow, CostSpec};

/// Metadata key holding the source file of a directive.
pub const META_FILENAME: &str = "filename";
/// Metadata key holding the 1-based source line of a directive.
pub const META_LINENO: &str = "lineno";

/// Metadata value types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaValue {
    /// Quoted string
    String(String),
    /// Account name
    Account(String),
    /// Currency code
    Currency(String),
    /// Tag, without the `#`
    Tag(String),
    /// Date
    Date(NaiveDate),
    /// Bare number
    Number(Decimal),
    /// Boolean
    Bool(bool),
    /// Number with currency
    Amount(Amount),
    /// Key present with no value
    None,
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Account(s) | Self::Currency(s) => f.write_str(s),
            Self::Tag(t) => write!(f, "#{t}"),
            Self::Date(d) => write!(f, "{d}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            Self::Amount(a) => write!(f, "{a}"),
            Self::None => Ok(()),
        }
    }
}

/// Key/value metadata attached to directives and postings.
///
/// Ordered so that serialization is deterministic.
pub type Metadata = BTreeMap<String, MetaValue>;

/// A source location: file name and 1-based line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// File the directive was read from
    pub filename: String,
    /// 1-based line number
    pub lineno: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename, self.lineno)
    }
}

/// Read the location stored in a metadata map, if any.
#[must_use]
pub fn location_of(meta: &Metadata) -> Option<Location> {
    let filename = match meta.get(META_FILENAME)? {
        MetaValue::String(s) => s.clone(),
        _ => return None,
    };
    let lineno = match meta.get(META_LINENO)? {
        MetaValue::Number(n) => n.to_u32()?,
        _ => return None,
    };
    Some(Location { filename, lineno })
}

/// Build a metadata map holding only a source location.
#[must_use]
pub fn location_meta(filename: &str, lineno: u32) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert(
        META_FILENAME.to_string(),
        MetaValue::String(filename.to_string()),
    );
    meta.insert(
        META_LINENO.to_string(),
        MetaValue::Number(Decimal::from(lineno)),
    );
    meta
}

/// Price annotation on a posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceAnnotation {
    /// `@`: price per unit
    Unit(Amount),
    /// `@@`: price for all units
    Total(Amount),
}

impl PriceAnnotation {
    /// Per-unit price for a posting of `units` units. `None` for zero units
    /// or a quotient out of range.
    #[must_use]
    pub fn per_unit(&self, units: Decimal) -> Option<Amount> {
        match self {
            Self::Unit(a) => Some(a.clone()),
            Self::Total(a) => Some(Amount::new(
                a.number.checked_div(units.abs())?,
                a.currency.clone(),
            )),
        }
    }

    /// The written amount, whichever form.
    #[must_use]
    pub const fn amount(&self) -> &Amount {
        match self {
            Self::Unit(a) | Self::Total(a) => a,
        }
    }
}

impl fmt::Display for PriceAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit(a) => write!(f, "@ {a}"),
            Self::Total(a) => write!(f, "@@ {a}"),
        }
    }
}

/// One leg of a transaction.
///
/// `units` is `None` when the amount is left for interpolation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Account the leg applies to
    pub account: String,
    /// Signed units
    pub units: Option<Amount>,
    /// Cost specification (`{...}`)
    pub cost: Option<CostSpec>,
    /// Price annotation (`@` or `@@`)
    pub price: Option<PriceAnnotation>,
    /// Posting flag
    pub flag: Option<char>,
    /// Posting metadata
    pub meta: Metadata,
}

impl Posting {
    /// A posting with complete units.
    #[must_use]
    pub fn new(account: impl Into<String>, units: Amount) -> Self {
        Self {
            account: account.into(),
            units: Some(units),
            cost: None,
            price: None,
            flag: None,
            meta: Metadata::new(),
        }
    }

    /// A posting whose amount is to be interpolated.
    #[must_use]
    pub fn auto(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            units: None,
            cost: None,
            price: None,
            flag: None,
            meta: Metadata::new(),
        }
    }

    /// Attach a cost spec.
    #[must_use]
    pub fn with_cost(mut self, cost: CostSpec) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Attach a price.
    #[must_use]
    pub fn with_price(mut self, price: PriceAnnotation) -> Self {
        self.price = Some(price);
        self
    }

    /// The amount this leg contributes to the transaction's balance.
    ///
    /// Units at cost weigh their total cost, units with a price weigh their
    /// converted value, plain units weigh themselves. `None` when the units
    /// are missing, the cost is not yet known, or the weight does not fit in
    /// a decimal; [`Posting::checked_weight`] tells the last case apart.
    #[must_use]
    pub fn weight(&self) -> Option<Amount> {
        self.checked_weight().ok().flatten()
    }

    /// [`Posting::weight`], failing when the product is out of range.
    pub fn checked_weight(&self) -> Result<Option<Amount>, ArithmeticOverflow> {
        let Some(units) = self.units.as_ref() else {
            return Ok(None);
        };
        let signed = |total: Decimal| if units.is_negative() { -total } else { total };
        if let Some(cost) = &self.cost {
            let Some(currency) = cost.currency.clone() else {
                return Ok(None);
            };
            let number = match (cost.number_per, cost.number_total) {
                (Some(per), _) => units.number.checked_mul(per).ok_or(ArithmeticOverflow)?,
                (None, Some(total)) => signed(total),
                (None, None) => return Ok(None),
            };
            return Ok(Some(Amount::new(number, currency)));
        }
        let weight = match &self.price {
            Some(PriceAnnotation::Unit(per)) => Amount::new(
                units.number.checked_mul(per.number).ok_or(ArithmeticOverflow)?,
                per.currency.clone(),
            ),
            Some(PriceAnnotation::Total(_)) if units.is_zero() => return Ok(None),
            Some(PriceAnnotation::Total(total)) => {
                Amount::new(signed(total.number), total.currency.clone())
            }
            None => units.clone(),
        };
        Ok(Some(weight))
    }
}

impl fmt::Display for Posting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(flag) = self.flag {
            write!(f, "{flag} ")?;
        }
        f.write_str(&self.account)?;
        if let Some(units) = &self.units {
            write!(f, "  {units}")?;
        }
        if let Some(cost) = &self.cost {
            write!(f, " {cost}")?;
        }
        if let Some(price) = &self.price {
            write!(f, " {price}")?;
        }
        Ok(())
    }
}

/// A transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Date
    pub date: NaiveDate,
    /// Flag (`*` complete, `!` pending, `P` padding)
    pub flag: char,
    /// Payee
    pub payee: Option<String>,
    /// Narration
    pub narration: String,
    /// Tags, without `#`
    pub tags: Vec<String>,
    /// Links, without `^`
    pub links: Vec<String>,
    /// Metadata
    pub meta: Metadata,
    /// Legs
    pub postings: Vec<Posting>,
}

impl Transaction {
    /// A completed transaction with no postings.
    #[must_use]
    pub fn new(date: NaiveDate, narration: impl Into<String>) -> Self {
        Self {
            date,
            flag: '*',
            payee: None,
            narration: narration.into(),
            tags: Vec::new(),
            links: Vec::new(),
            meta: Metadata::new(),
            postings: Vec::new(),
        }
    }

    /// Set the flag.
    #[must_use]
    pub const fn with_flag(mut self, flag: char) -> Self {
        self.flag = flag;
        self
    }

    /// Set the payee.
    #[must_use]
    pub fn with_payee(mut self, payee: impl Into<String>) -> Self {
        self.payee = Some(payee.into());
        self
    }

    /// Append a posting.
    #[must_use]
    pub fn with_posting(mut self, posting: Posting) -> Self {
        self.postings.push(posting);
        self
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.flag)?;
        if let Some(payee) = &self.payee {
            write!(f, " \"{payee}\"")?;
        }
        write!(f, " \"{}\"", self.narration)?;
        for tag in &self.tags {
            write!(f, " #{tag}")?;
        }
        for link in &self.links {
            write!(f, " ^{link}")?;
        }
        for posting in &self.postings {
            write!(f, "\n  {posting}")?;
        }
        Ok(())
    }
}

/// Opens an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Open {
    /// Date
    pub date: NaiveDate,
    /// Account name
    pub account: String,
    /// Currencies the account is constrained to
    pub currencies: Vec<String>,
    /// Booking method for reductions in this account
    pub booking: Option<String>,
    /// Metadata
    pub meta: Metadata,
}

impl Open {
    /// Open `account` on `date`.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<String>) -> Self {
        Self {
            date,
            account: account.into(),
            currencies: Vec::new(),
            booking: None,
            meta: Metadata::new(),
        }
    }

    /// Set the booking method.
    #[must_use]
    pub fn with_booking(mut self, booking: impl Into<String>) -> Self {
        self.booking = Some(booking.into());
        self
    }
}

/// Closes an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Close {
    /// Date
    pub date: NaiveDate,
    /// Account name
    pub account: String,
    /// Metadata
    pub meta: Metadata,
}

/// Declares a commodity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commodity {
    /// Date
    pub date: NaiveDate,
    /// Currency code
    pub currency: String,
    /// Metadata
    pub meta: Metadata,
}

/// Pads `account` from `source_account` up to the next balance assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pad {
    /// Date
    pub date: NaiveDate,
    /// Account to pad
    pub account: String,
    /// Account the padding comes from
    pub source_account: String,
    /// Metadata
    pub meta: Metadata,
}

/// Asserts the units of one currency held in an account and its children
/// at the beginning of `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Date
    pub date: NaiveDate,
    /// Account name
    pub account: String,
    /// Expected units
    pub amount: Amount,
    /// Explicit tolerance (`~`)
    pub tolerance: Option<Decimal>,
    /// Metadata
    pub meta: Metadata,
}

impl Balance {
    /// Assert `amount` in `account` on `date`.
    #[must_use]
    pub fn new(date: NaiveDate, account: impl Into<String>, amount: Amount) -> Self {
        Self {
            date,
            account: account.into(),
            amount,
            tolerance: None,
            meta: Metadata::new(),
        }
    }
}

/// Free-form note on an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Date
    pub date: NaiveDate,
    /// Account name
    pub account: String,
    /// Note text
    pub comment: String,
    /// Metadata
    pub meta: Metadata,
}

/// Associates a document path with an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Date
    pub date: NaiveDate,
    /// Account name
    pub account: String,
    /// Path to the document
    pub path: String,
    /// Metadata
    pub meta: Metadata,
}

/// Price of a commodity in another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Date
    pub date: NaiveDate,
    /// Commodity being priced
    pub currency: String,
    /// Price per unit
    pub amount: Amount,
    /// Metadata
    pub meta: Metadata,
}

/// Value change of a named variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Date
    pub date: NaiveDate,
    /// Event name
    pub event_type: String,
    /// New value
    pub value: String,
    /// Metadata
    pub meta: Metadata,
}

/// A named query stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Date
    pub date: NaiveDate,
    /// Query name
    pub name: String,
    /// Query text
    pub query: String,
    /// Metadata
    pub meta: Metadata,
}

/// User-defined directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Custom {
    /// Date
    pub date: NaiveDate,
    /// Directive type name
    pub custom_type: String,
    /// Arguments
    pub values: Vec<MetaValue>,
    /// Metadata
    pub meta: Metadata,
}

/// Tie-breaker among directives sharing a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DirectivePriority {
    /// Accounts exist before anything uses them
    Open,
    /// Commodity declarations
    Commodity,
    /// Padding precedes the assertion it satisfies
    Pad,
    /// Assertions apply at the start of the day
    Balance,
    /// Everything else dated that day
    Other,
    /// Prices at the end of the day
    Price,
    /// Accounts close after the day's activity
    Close,
}

/// Any directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Directive {
    /// Transaction
    Transaction(Transaction),
    /// Account opening
    Open(Open),
    /// Account closing
    Close(Close),
    /// Commodity declaration
    Commodity(Commodity),
    /// Padding request
    Pad(Pad),
    /// Balance assertion
    Balance(Balance),
    /// Account note
    Note(Note),
    /// Account document
    Document(Document),
    /// Price
    Price(Price),
    /// Event
    Event(Event),
    /// Stored query
    Query(Query),
    /// Custom directive
    Custom(Custom),
}

macro_rules! each_variant {
    ($self:expr, $d:ident => $body:expr) => {
        match $self {
            Directive::Transaction($d) => $body,
            Directive::Open($d) => $body,
            Directive::Close($d) => $body,
            Directive::Commodity($d) => $body,
            Directive::Pad($d) => $body,
            Directive::Balance($d) => $body,
            Directive::Note($d) => $body,
            Directive::Document($d) => $body,
            Directive::Price($d) => $body,
            Directive::Event($d) => $body,
            Directive::Query($d) => $body,
            Directive::Custom($d) => $body,
        }
    };
}

impl Directive {
    /// Date of the directive.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        each_variant!(self, d => d.date)
    }

    /// Metadata of the directive.
    #[must_use]
    pub const fn meta(&self) -> &Metadata {
        each_variant!(self, d => &d.meta)
    }

    /// Mutable metadata of the directive.
    pub fn meta_mut(&mut self) -> &mut Metadata {
        each_variant!(self, d => &mut d.meta)
    }

    /// Where the directive was read from, if recorded.
    #[must_use]
    pub fn location(&self) -> Option<Location> {
        location_of(self.meta())
    }

    /// Lowercase keyword of the directive.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Transaction(_) => "transaction",
            Self::Open(_) => "open",
            Self::Close(_) => "close",
            Self::Commodity(_) => "commodity",
            Self::Pad(_) => "pad",
            Self::Balance(_) => "balance",
            Self::Note(_) => "note",
            Self::Document(_) => "document",
            Self::Price(_) => "price",
            Self::Event(_) => "event",
            Self::Query(_) => "query",
            Self::Custom(_) => "custom",
        }
    }

    /// Same-day ordering rank.
    #[must_use]
    pub const fn priority(&self) -> DirectivePriority {
        match self {
            Self::Open(_) => DirectivePriority::Open,
            Self::Commodity(_) => DirectivePriority::Commodity,
            Self::Pad(_) => DirectivePriority::Pad,
            Self::Balance(_) => DirectivePriority::Balance,
            Self::Price(_) => DirectivePriority::Price,
            Self::Close(_) => DirectivePriority::Close,
            _ => DirectivePriority::Other,
        }
    }

    /// Accounts this directive refers to, in field order.
    ///
    /// A transaction yields one entry per posting, so an account posted to
    /// twice appears twice.
    #[must_use]
    pub fn accounts(&self) -> Vec<&str> {
        match self {
            Self::Transaction(t) => t.postings.iter().map(|p| p.account.as_str()).collect(),
            Self::Open(o) => vec![&o.account],
            Self::Close(c) => vec![&c.account],
            Self::Pad(p) => vec![&p.account, &p.source_account],
            Self::Balance(b) => vec![&b.account],
            Self::Note(n) => vec![&n.account],
            Self::Document(d) => vec![&d.account],
            Self::Commodity(_)
            | Self::Price(_)
            | Self::Event(_)
            | Self::Query(_)
            | Self::Custom(_) => Vec::new(),
        }
    }

    /// The transaction, if this is one.
    #[must_use]
    pub const fn as_transaction(&self) -> Option<&Transaction> {
        match self {
            Self::Transaction(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transaction(t) => write!(f, "{t}"),
            Self::Open(o) => write!(f, "{} open {}", o.date, o.account),
            Self::Close(c) => write!(f, "{} close {}", c.date, c.account),
            Self::Pad(p) => write!(f, "{} pad {} {}", p.date, p.account, p.source_account),
            Self::Balance(b) => write!(f, "{} balance {} {}", b.date, b.account, b.amount),
            Self::Price(p) => write!(f, "{} price {} {}", p.date, p.currency, p.amount),
            other => write!(f, "{} {}", other.date(), other.type_name()),
        }
    }
}

/// Stable sort by date, then same-day priority. File order is kept otherwise.
pub fn sort_directives(directives: &mut [Directive]) {
    directives.sort_by(|a, b| {
        a.date()
            .cmp(&b.date())
            .then_with(|| a.priority().cmp(&b.priority()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_location_round_trip() {
        let mut open = Open::new(date(2024, 1, 1), "Assets:Cash");
        open.meta = location_meta("main.beancount", 12);
        let directive = Directive::Open(open);
        assert_eq!(
            directive.location(),
            Some(Location {
                filename: "main.beancount".to_string(),
                lineno: 12
            })
        );
    }

    #[test]
    fn test_accounts_of_pad_lists_both_sides() {
        let pad = Directive::Pad(Pad {
            date: date(2024, 1, 1),
            account: "Assets:Cash".to_string(),
            source_account: "Equity:Opening".to_string(),
            meta: Metadata::new(),
        });
        assert_eq!(pad.accounts(), vec!["Assets:Cash", "Equity:Opening"]);
    }

    #[test]
    fn test_accounts_of_transaction_keeps_duplicates() {
        let txn = Transaction::new(date(2024, 1, 1), "split")
            .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-5), "USD")))
            .with_posting(Posting::new("Assets:Cash", Amount::new(dec!(-5), "USD")))
            .with_posting(Posting::new("Expenses:Food", Amount::new(dec!(10), "USD")));
        let d = Directive::Transaction(txn);
        assert_eq!(d.accounts(), vec!["Assets:Cash", "Assets:Cash", "Expenses:Food"]);
    }

    #[test]
    fn test_sort_is_by_date_then_priority() {
        let day = date(2024, 1, 1);
        let mut directives = vec![
            Directive::Close(Close {
                date: day,
                account: "Assets:Cash".to_string(),
                meta: Metadata::new(),
            }),
            Directive::Transaction(Transaction::new(day, "t")),
            Directive::Open(Open::new(day, "Assets:Cash")),
            Directive::Open(Open::new(date(2023, 12, 31), "Assets:Bank")),
        ];
        sort_directives(&mut directives);
        let names: Vec<_> = directives.iter().map(Directive::type_name).collect();
        assert_eq!(names, vec!["open", "open", "transaction", "close"]);
        assert_eq!(directives[0].date(), date(2023, 12, 31));
    }

    #[test]
    fn test_weight() {
        let at_cost = Posting::new("Assets:Broker", Amount::new(dec!(10), "GOOG")).with_cost(
            CostSpec::empty()
                .with_number_per(dec!(45))
                .with_currency("USD"),
        );
        assert_eq!(at_cost.weight(), Some(Amount::new(dec!(450), "USD")));

        let priced = Posting::new("Assets:Cash", Amount::new(dec!(-100), "CAD"))
            .with_price(PriceAnnotation::Total(Amount::new(dec!(75), "USD")));
        assert_eq!(priced.weight(), Some(Amount::new(dec!(-75), "USD")));

        assert_eq!(Posting::auto("Assets:Cash").weight(), None);
    }

    #[test]
    fn test_weight_out_of_range() {
        let tiny = Posting::new(
            "Assets:Broker",
            Amount::new(dec!(0.0000000000000000000000000001), "GOOG"),
        )
        .with_price(PriceAnnotation::Total(Amount::new(Decimal::MAX, "USD")));
        assert_eq!(
            tiny.checked_weight(),
            Ok(Some(Amount::new(Decimal::MAX, "USD")))
        );
        assert_eq!(
            PriceAnnotation::Total(Amount::new(Decimal::MAX, "USD"))
                .per_unit(dec!(0.0000000000000000000000000001)),
            None
        );

        let huge = Posting::new("Assets:Broker", Amount::new(Decimal::MAX, "GOOG"))
            .with_price(PriceAnnotation::Unit(Amount::new(dec!(2), "USD")));
        assert_eq!(huge.checked_weight(), Err(ArithmeticOverflow));
        assert_eq!(huge.weight(), None);
    }
}
