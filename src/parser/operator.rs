//! Operator expression parsing for SecRule.

use crate::error::{Error, Result};
use phf::phf_map;

/// An operator expression as written in a SecRule.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorSpec {
    /// Whether the operator is negated (`!` prefix).
    pub negated: bool,
    /// The operator.
    pub name: OperatorName,
    /// Parameter text after the operator name.
    pub argument: String,
}

impl OperatorSpec {
    /// Operator as written, e.g. `!@rx ^a`.
    pub fn display(&self) -> String {
        let bang = if self.negated { "!" } else { "" };
        if self.argument.is_empty() {
            format!("{}@{}", bang, self.name.as_str())
        } else {
            format!("{}@{} {}", bang, self.name.as_str(), self.argument)
        }
    }
}

/// Supported operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorName {
    /// Regular expression match.
    Rx,
    /// Phrase match (Aho-Corasick).
    Pm,
    /// Phrase match with phrases read from files.
    PmFromFile,
    /// Prefix match.
    BeginsWith,
    /// Substring match.
    Contains,
    /// Substring match on word boundaries.
    ContainsWord,
    /// Suffix match.
    EndsWith,
    /// String equality.
    StrEq,
    /// Substring match (single pattern).
    StrMatch,
    /// Value is a substring of the parameter.
    Within,
    /// Numeric equality.
    Eq,
    /// Numeric inequality.
    Ne,
    /// Numeric greater-than.
    Gt,
    /// Numeric greater-or-equal.
    Ge,
    /// Numeric less-than.
    Lt,
    /// Numeric less-or-equal.
    Le,
    /// IP address in a CIDR set.
    IpMatch,
    /// IP address in a CIDR set read from files.
    IpMatchFromFile,
    /// Country lookup.
    GeoLookup,
    /// DNS block list lookup.
    Rbl,
    /// SQL injection detection.
    DetectSqli,
    /// XSS detection.
    DetectXss,
    /// Byte range validation.
    ValidateByteRange,
    /// URL encoding validation.
    ValidateUrlEncoding,
    /// UTF-8 validation.
    ValidateUtf8Encoding,
    /// Credit card number detection.
    VerifyCc,
    /// External file inspection.
    InspectFile,
    /// Always true.
    UnconditionalMatch,
    /// Always false.
    NoMatch,
}

static OPERATOR_MAP: phf::Map<&'static str, OperatorName> = phf_map! {
    "rx" => OperatorName::Rx,
    "pm" => OperatorName::Pm,
    "pmfromfile" => OperatorName::PmFromFile,
    "pmf" => OperatorName::PmFromFile,
    "beginswith" => OperatorName::BeginsWith,
    "contains" => OperatorName::Contains,
    "containsword" => OperatorName::ContainsWord,
    "endswith" => OperatorName::EndsWith,
    "streq" => OperatorName::StrEq,
    "strmatch" => OperatorName::StrMatch,
    "within" => OperatorName::Within,
    "eq" => OperatorName::Eq,
    "ne" => OperatorName::Ne,
    "gt" => OperatorName::Gt,
    "ge" => OperatorName::Ge,
    "lt" => OperatorName::Lt,
    "le" => OperatorName::Le,
    "ipmatch" => OperatorName::IpMatch,
    "ipmatchfromfile" => OperatorName::IpMatchFromFile,
    "ipmatchf" => OperatorName::IpMatchFromFile,
    "geolookup" => OperatorName::GeoLookup,
    "rbl" => OperatorName::Rbl,
    "detectsqli" => OperatorName::DetectSqli,
    "detectxss" => OperatorName::DetectXss,
    "validatebyterange" => OperatorName::ValidateByteRange,
    "validateurlencoding" => OperatorName::ValidateUrlEncoding,
    "validateutf8encoding" => OperatorName::ValidateUtf8Encoding,
    "verifycc" => OperatorName::VerifyCc,
    "inspectfile" => OperatorName::InspectFile,
    "unconditionalmatch" => OperatorName::UnconditionalMatch,
    "nomatch" => OperatorName::NoMatch,
};

impl OperatorName {
    /// Look up an operator by name, ignoring case.
    #[inline]
    pub fn from_name(s: &str) -> Option<Self> {
        if s.bytes().all(|b| !b.is_ascii_uppercase()) {
            return OPERATOR_MAP.get(s).copied();
        }
        OPERATOR_MAP.get(s.to_ascii_lowercase().as_str()).copied()
    }

    /// Canonical spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rx => "rx",
            Self::Pm => "pm",
            Self::PmFromFile => "pmFromFile",
            Self::BeginsWith => "beginsWith",
            Self::Contains => "contains",
            Self::ContainsWord => "containsWord",
            Self::EndsWith => "endsWith",
            Self::StrEq => "streq",
            Self::StrMatch => "strmatch",
            Self::Within => "within",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::IpMatch => "ipMatch",
            Self::IpMatchFromFile => "ipMatchFromFile",
            Self::GeoLookup => "geoLookup",
            Self::Rbl => "rbl",
            Self::DetectSqli => "detectSQLi",
            Self::DetectXss => "detectXSS",
            Self::ValidateByteRange => "validateByteRange",
            Self::ValidateUrlEncoding => "validateUrlEncoding",
            Self::ValidateUtf8Encoding => "validateUtf8Encoding",
            Self::VerifyCc => "verifyCC",
            Self::InspectFile => "inspectFile",
            Self::UnconditionalMatch => "unconditionalMatch",
            Self::NoMatch => "noMatch",
        }
    }

    /// Whether the operator needs a parameter.
    #[inline]
    pub fn requires_argument(&self) -> bool {
        !matches!(
            self,
            Self::DetectSqli
                | Self::DetectXss
                | Self::ValidateUrlEncoding
                | Self::ValidateUtf8Encoding
                | Self::UnconditionalMatch
                | Self::NoMatch
                | Self::GeoLookup
        )
    }
}

/// Parse an operator expression. A bare pattern means `@rx`.
pub fn parse_operator(input: &str) -> Result<OperatorSpec> {
    let input = input.trim();

    let (negated, input) = match input.strip_prefix('!') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, input),
    };

    let Some(rest) = input.strip_prefix('@') else {
        return Ok(OperatorSpec {
            negated,
            name: OperatorName::Rx,
            argument: input.to_string(),
        });
    };

    let (name_str, argument) = match rest.find(|c: char| c.is_ascii_whitespace()) {
        Some(pos) => (&rest[..pos], rest[pos..].trim_start()),
        None => (rest, ""),
    };

    let name = OperatorName::from_name(name_str).ok_or_else(|| Error::UnknownOperator {
        name: name_str.to_string(),
    })?;

    if name.requires_argument() && argument.is_empty() {
        return Err(Error::invalid_directive(
            "SecRule",
            format!("operator @{} requires a parameter", name.as_str()),
        ));
    }
    if argument.starts_with("@remote") || argument.starts_with("https://") {
        return Err(Error::invalid_directive(
            "SecRule",
            format!("remote parameters are not supported for @{}", name.as_str()),
        ));
    }

    Ok(OperatorSpec {
        negated,
        name,
        argument: argument.to_string(),
    })
}
