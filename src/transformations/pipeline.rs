//! Transformation pipeline.

use super::{lookup, Transformation};
use crate::error::Result;
use std::borrow::Cow;

/// A sequence of transformations applied in order.
#[derive(Debug, Clone, Default)]
pub struct TransformationPipeline {
    transformations: Vec<Transformation>,
}

impl TransformationPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pipeline from `t:` names. `none` discards everything before it.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut pipeline = Self::new();
        for name in names {
            pipeline.push_name(name.as_ref())?;
        }
        Ok(pipeline)
    }

    /// Append a transformation by name; `none` clears the pipeline.
    pub fn push_name(&mut self, name: &str) -> Result<()> {
        if name.eq_ignore_ascii_case("none") {
            self.transformations.clear();
        } else {
            self.transformations.push(lookup(name)?);
        }
        Ok(())
    }

    /// Append a transformation.
    pub fn push(&mut self, transformation: Transformation) {
        self.transformations.push(transformation);
    }

    /// Append every transformation of `other`.
    pub fn extend(&mut self, other: &TransformationPipeline) {
        self.transformations.extend_from_slice(&other.transformations);
    }

    /// Apply all transformations in sequence.
    pub fn apply<'a>(&self, input: &'a [u8]) -> Cow<'a, [u8]> {
        let mut current: Cow<'a, [u8]> = Cow::Borrowed(input);
        for t in &self.transformations {
            current = step(current, t);
        }
        current
    }

    /// Values to test under `multiMatch`: the raw input, then the output of
    /// each step, skipping a value equal to the one before it.
    pub fn candidates(&self, input: &[u8]) -> Vec<Vec<u8>> {
        let mut out = vec![input.to_vec()];
        let mut current: Cow<'_, [u8]> = Cow::Borrowed(input);
        for t in &self.transformations {
            current = step(current, t);
            if out.last().map(Vec::as_slice) != Some(current.as_ref()) {
                out.push(current.to_vec());
            }
        }
        out
    }

    /// Transformation names in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.transformations.iter().map(|t| t.name).collect()
    }

    /// Whether the pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.transformations.is_empty()
    }

    /// Number of transformations.
    pub fn len(&self) -> usize {
        self.transformations.len()
    }
}

fn step<'a>(current: Cow<'a, [u8]>, t: &Transformation) -> Cow<'a, [u8]> {
    match current {
        Cow::Borrowed(s) => t.apply(s),
        Cow::Owned(s) => match t.apply(&s) {
            Cow::Borrowed(b) if b.len() == s.len() => Cow::Owned(s),
            other => Cow::Owned(other.into_owned()),
        },
    }
}
