//! Operator implementations.
//!
//! Operators are compiled from an [`OperatorSpec`] when a rule is loaded;
//! compile failures (bad regex, unreadable data file, malformed network)
//! surface as load errors.

mod comparison;
mod detection;
mod file;
mod network;
mod pattern;
mod traits;
mod validation;

pub use comparison::{Comparison, NumericOperator, StringMatch, StringOperator};
pub use detection::{DetectSqliOperator, DetectXssOperator};
pub use file::InspectFileOperator;
pub use network::{
    parse_network, CidrGeoDatabase, GeoDatabase, GeoLookupOperator, IpMatchOperator, RblOperator,
};
pub use pattern::{PmOperator, RxOperator};
pub use traits::{Operator, OperatorContext};
pub use validation::{
    ValidateByteRangeOperator, ValidateUrlEncodingOperator, ValidateUtf8EncodingOperator,
    VerifyCcOperator,
};

use crate::error::Result;
use crate::macros::MacroString;
use crate::parser::{parse_operator, OperatorName, OperatorSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Compile an operator expression such as `@rx ^a` (convenience for tools
/// and benchmarks). Data files resolve against the current directory.
pub fn create_operator(expression: &str) -> Result<Arc<dyn Operator>> {
    compile_operator(&parse_operator(expression)?, Path::new("."))
}

/// Compile an operator. `root` is the directory data files are read from.
pub fn compile_operator(spec: &OperatorSpec, root: &Path) -> Result<Arc<dyn Operator>> {
    let arg = spec.argument.as_str();
    let op: Arc<dyn Operator> = match spec.name {
        OperatorName::Rx => Arc::new(RxOperator::new(arg)?),
        OperatorName::Pm => Arc::new(PmOperator::new(arg)?),
        OperatorName::PmFromFile => Arc::new(PmOperator::from_files(arg, root)?),
        OperatorName::BeginsWith => string_op(StringMatch::BeginsWith, arg)?,
        OperatorName::Contains => string_op(StringMatch::Contains, arg)?,
        OperatorName::ContainsWord => string_op(StringMatch::ContainsWord, arg)?,
        OperatorName::EndsWith => string_op(StringMatch::EndsWith, arg)?,
        OperatorName::StrEq => string_op(StringMatch::StrEq, arg)?,
        OperatorName::StrMatch => string_op(StringMatch::StrMatch, arg)?,
        OperatorName::Within => string_op(StringMatch::Within, arg)?,
        OperatorName::Eq => numeric_op(Comparison::Eq, arg)?,
        OperatorName::Ne => numeric_op(Comparison::Ne, arg)?,
        OperatorName::Gt => numeric_op(Comparison::Gt, arg)?,
        OperatorName::Ge => numeric_op(Comparison::Ge, arg)?,
        OperatorName::Lt => numeric_op(Comparison::Lt, arg)?,
        OperatorName::Le => numeric_op(Comparison::Le, arg)?,
        OperatorName::IpMatch => Arc::new(IpMatchOperator::new(arg)?),
        OperatorName::IpMatchFromFile => Arc::new(IpMatchOperator::from_files(arg, root)?),
        OperatorName::GeoLookup => Arc::new(GeoLookupOperator),
        OperatorName::Rbl => Arc::new(RblOperator::new(arg)),
        OperatorName::DetectSqli => Arc::new(DetectSqliOperator),
        OperatorName::DetectXss => Arc::new(DetectXssOperator),
        OperatorName::ValidateByteRange => Arc::new(ValidateByteRangeOperator::new(arg)?),
        OperatorName::ValidateUrlEncoding => Arc::new(ValidateUrlEncodingOperator),
        OperatorName::ValidateUtf8Encoding => Arc::new(ValidateUtf8EncodingOperator),
        OperatorName::VerifyCc => Arc::new(VerifyCcOperator::new(arg)?),
        OperatorName::InspectFile => Arc::new(InspectFileOperator::new(resolve_program(arg, root))),
        OperatorName::UnconditionalMatch => Arc::new(UnconditionalMatchOperator),
        OperatorName::NoMatch => Arc::new(NoMatchOperator),
    };
    Ok(op)
}

fn string_op(kind: StringMatch, arg: &str) -> Result<Arc<dyn Operator>> {
    Ok(Arc::new(StringOperator::new(kind, MacroString::new(arg)?)))
}

fn numeric_op(cmp: Comparison, arg: &str) -> Result<Arc<dyn Operator>> {
    Ok(Arc::new(NumericOperator::new(cmp, MacroString::new(arg)?)))
}

fn resolve_program(arg: &str, root: &Path) -> PathBuf {
    let candidate = root.join(arg);
    if candidate.exists() {
        candidate
    } else {
        PathBuf::from(arg)
    }
}

/// Operator that never matches (@noMatch).
pub struct NoMatchOperator;

impl Operator for NoMatchOperator {
    fn evaluate(&self, _ctx: &mut OperatorContext<'_>, _value: &[u8]) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "noMatch"
    }
}

/// Operator that always matches (@unconditionalMatch).
pub struct UnconditionalMatchOperator;

impl Operator for UnconditionalMatchOperator {
    fn evaluate(&self, _ctx: &mut OperatorContext<'_>, _value: &[u8]) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "unconditionalMatch"
    }
}
