//! External file inspection (@inspectFile).

use super::traits::{Operator, OperatorContext};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Runs a helper program with the value as its only argument; exit status
/// 0 is a match. The helper is killed after ten seconds.
pub struct InspectFileOperator {
    program: PathBuf,
    timeout: Duration,
}

impl InspectFileOperator {
    /// `program` is resolved by the caller against the rules directory.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            timeout: Duration::from_secs(10),
        }
    }

    fn run(&self, value: &[u8]) -> std::io::Result<Option<bool>> {
        let mut child = Command::new(&self.program)
            .arg(String::from_utf8_lossy(value).as_ref())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status.success()));
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Operator for InspectFileOperator {
    fn evaluate(&self, ctx: &mut OperatorContext<'_>, value: &[u8]) -> bool {
        match self.run(value) {
            Ok(Some(positive)) => positive,
            Ok(None) => {
                ctx.debug.warn(format_args!(
                    "@inspectFile {} timed out",
                    self.program.display()
                ));
                false
            }
            Err(e) => {
                ctx.debug.warn(format_args!(
                    "@inspectFile {} failed: {}",
                    self.program.display(),
                    e
                ));
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "inspectFile"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::operators::tests::eval;

    #[test]
    fn test_exit_status_decides() {
        // `test STRING` succeeds for a non-empty argument.
        let op = InspectFileOperator::new(PathBuf::from("test"));
        assert!(eval(&op, "upload.bin"));
        assert!(!eval(&op, ""));
    }

    #[test]
    fn test_missing_program_is_no_match() {
        let op = InspectFileOperator::new(PathBuf::from("/nonexistent/helper"));
        assert!(!eval(&op, "x"));
    }

    #[test]
    fn test_timeout_is_no_match() {
        let mut op = InspectFileOperator::new(PathBuf::from("sleep"));
        op.timeout = Duration::from_millis(100);
        assert!(!eval(&op, "5"));
    }
}
