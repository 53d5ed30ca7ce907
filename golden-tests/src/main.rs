use anyhow::{Context, bail};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const TESTS_ROOT: &str = "golden-tests/tests";
const ARGS_FILE: &str = "args";
const STDIN_FILE: &str = "stdin";
const EXPECTED_STDOUT_FILE: &str = "expected-stdout";

struct TestCase {
    dir: PathBuf,
    args: String,
    stdin: Option<String>,
    expected_stdout: Option<String>,
}

impl TestCase {
    fn load(dir: PathBuf) -> anyhow::Result<Self> {
        let args_path = dir.join(ARGS_FILE);
        let args = std::fs::read_to_string(&args_path)
            .with_context(|| format!("no `{ARGS_FILE}` file found at `{}`", args_path.display()))?;

        Ok(Self {
            stdin: read_optional(&dir.join(STDIN_FILE))?,
            expected_stdout: read_optional(&dir.join(EXPECTED_STDOUT_FILE))?,
            args,
            dir,
        })
    }

    fn name(&self) -> String {
        self.dir.display().to_string()
    }
}

fn read_optional(path: &Path) -> anyhow::Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    Ok(Some(contents))
}

/// Runs `router-lab` once per directory under `golden-tests/tests` and compares its stdout
///
/// A missing `expected-stdout` is recorded from the current output.
fn main() -> anyhow::Result<()> {
    let mut test_cases = Vec::new();
    let test_dirs = std::fs::read_dir(TESTS_ROOT).context("golden tests root directory not found")?;
    for entry in test_dirs {
        let path = entry?.path();
        if !path.is_dir() {
            println!(
                "skipping path `{}` because it's not a directory",
                path.display()
            );
            continue;
        }

        test_cases.push(TestCase::load(path)?);
    }
    test_cases.sort_by(|a, b| a.dir.cmp(&b.dir));

    let mut errored = false;
    for test_case in test_cases {
        let name = test_case.name();
        match run_router_lab(test_case) {
            Ok(()) => println!("{name}: ✅"),
            Err(TestError::Internal(e)) => {
                println!("Error running golden test `{name}`");
                println!("{e:?}");
                errored = true;
            }
            Err(TestError::StdoutDiffers(diff)) => {
                println!("Error running golden test `{name}`");
                println!("Expected stdout differs from actual stdout:\n{diff}");
                errored = true;
            }
        }
    }

    if errored {
        bail!("one or more golden tests failed");
    }

    Ok(())
}

enum TestError {
    Internal(anyhow::Error),
    StdoutDiffers(String),
}

fn run_router_lab(test_case: TestCase) -> Result<(), TestError> {
    let mut child = Command::new("cargo")
        .args(["run", "--release", "--bin", "router-lab", "--"])
        .args(test_case.args.split_whitespace())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to spawn router-lab")
        .map_err(TestError::Internal)?;

    // Dropping stdin closes it, which ends the shell if the script does not
    if let Some(mut stdin) = child.stdin.take() {
        let script = test_case.stdin.unwrap_or_default();
        stdin
            .write_all(script.as_bytes())
            .context("failed to write the shell script to router-lab")
            .map_err(TestError::Internal)?;
    }

    let output = child
        .wait_with_output()
        .context("router-lab process crashed")
        .map_err(TestError::Internal)?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    match test_case.expected_stdout {
        Some(expected_stdout) if expected_stdout != stdout => Err(TestError::StdoutDiffers(
            diff::diff_to_string(&expected_stdout, &stdout),
        )),
        Some(_) => Ok(()),
        None => std::fs::write(test_case.dir.join(EXPECTED_STDOUT_FILE), stdout.as_bytes())
            .context("failed to persist stdout")
            .map_err(TestError::Internal),
    }
}

mod diff {
    use console::{Style, style};
    use similar::{ChangeTag, TextDiff};
    use std::fmt::{self, Write};

    /// A one-based line number, or blanks when the line is absent on that side
    struct LineNumber(Option<usize>);

    impl fmt::Display for LineNumber {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            match self.0 {
                None => write!(f, "    "),
                Some(idx) => write!(f, "{:<4}", idx + 1),
            }
        }
    }

    pub fn diff_to_string(expected: &str, actual: &str) -> String {
        let mut output = String::new();
        let diff = TextDiff::from_lines(expected, actual);

        for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
            if idx > 0 {
                _ = writeln!(output, "{:-^1$}", "-", 80);
            }

            for change in group.iter().flat_map(|op| diff.iter_inline_changes(op)) {
                let (sign, line_style) = match change.tag() {
                    ChangeTag::Delete => ("-", Style::new().red()),
                    ChangeTag::Insert => ("+", Style::new().green()),
                    ChangeTag::Equal => (" ", Style::new().dim()),
                };
                _ = write!(
                    output,
                    "{}{} |{}",
                    style(LineNumber(change.old_index())).dim(),
                    style(LineNumber(change.new_index())).dim(),
                    line_style.apply_to(sign).bold(),
                );

                for (emphasized, value) in change.iter_strings_lossy() {
                    let value = line_style.apply_to(value);
                    if emphasized {
                        _ = write!(output, "{}", value.underlined().on_black());
                    } else {
                        _ = write!(output, "{value}");
                    }
                }

                if change.missing_newline() {
                    _ = writeln!(output);
                }
            }
        }

        output
    }
}
