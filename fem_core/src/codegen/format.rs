//! Number and command formatting shared by every dialect.

use std::fmt;

use crate::codegen::Dialect;

/// Format `value` rounded to `digits` significant digits.
///
/// Plain decimal notation is used between 1e-5 and 1e15, exponent notation
/// outside. The result always reads as a float (`3.0`, never `3`) and is
/// identical for identical input.
pub fn format_number(value: f64, digits: usize) -> String {
    if value == 0.0 || !value.is_finite() {
        return if value.is_finite() { "0.0".to_string() } else { value.to_string() };
    }
    let digits = digits.clamp(1, 17);
    let rounded: f64 = format!("{:.*e}", digits - 1, value).parse().unwrap_or(value);
    let magnitude = rounded.abs();

    let text = if (1e-5..1e15).contains(&magnitude) {
        rounded.to_string()
    } else {
        format!("{:e}", rounded)
    };
    if text.contains(&['.', 'e'][..]) {
        text
    } else {
        format!("{}.0", text)
    }
}

/// One argument of a generated command.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Num(f64),
    /// Keyword or flag: bare in Tcl, quoted in Python
    Word(String),
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<u64> for Arg {
    fn from(value: u64) -> Self {
        Arg::Int(value as i64)
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Arg::Int(i64::from(value))
    }
}

impl From<u8> for Arg {
    fn from(value: u8) -> Self {
        Arg::Int(i64::from(value))
    }
}

impl From<usize> for Arg {
    fn from(value: usize) -> Self {
        Arg::Int(value as i64)
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Num(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Word(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Word(value)
    }
}

/// Build an argument list from mixed values: `args![1u64, "Elastic", 2.0e11]`.
macro_rules! args {
    ($($arg:expr),* $(,)?) => {
        vec![$($crate::codegen::format::Arg::from($arg)),*]
    };
}
pub(crate) use args;

/// Renders commands for one dialect and precision.
#[derive(Debug, Clone, Copy)]
pub struct CommandWriter {
    pub dialect: Dialect,
    pub digits: usize,
}

impl CommandWriter {
    pub fn new(dialect: Dialect, digits: usize) -> Self {
        CommandWriter { dialect, digits }
    }

    /// `name a b c` in Tcl, `ops.name(a, b, c)` in Python.
    pub fn command(&self, name: &str, args: &[Arg]) -> String {
        let rendered = args.iter().map(|arg| RenderedArg { arg, writer: self });
        match self.dialect {
            Dialect::Tcl => {
                let mut line = name.to_string();
                for arg in rendered {
                    line.push(' ');
                    line.push_str(&arg.to_string());
                }
                line
            }
            Dialect::Python => {
                let parts: Vec<String> = rendered.map(|arg| arg.to_string()).collect();
                format!("ops.{}({})", name, parts.join(", "))
            }
        }
    }

    pub fn comment(&self, text: &str) -> String {
        format!("# {}", text)
    }

    /// Opening line of a plain load pattern. Tcl wraps the pattern's loads
    /// in a block; Python applies them to the most recent pattern.
    pub fn pattern_open(&self, tag: usize, series: usize) -> String {
        let line = self.command("pattern", &args!["Plain", tag, series]);
        match self.dialect {
            Dialect::Tcl => format!("{} {{", line),
            Dialect::Python => line,
        }
    }

    pub fn pattern_close(&self) -> Option<String> {
        match self.dialect {
            Dialect::Tcl => Some("}".to_string()),
            Dialect::Python => None,
        }
    }

    /// Indentation for lines inside a pattern block
    pub fn pattern_indent(&self) -> &'static str {
        match self.dialect {
            Dialect::Tcl => "    ",
            Dialect::Python => "",
        }
    }
}

struct RenderedArg<'a> {
    arg: &'a Arg,
    writer: &'a CommandWriter,
}

impl fmt::Display for RenderedArg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arg {
            Arg::Int(value) => write!(f, "{}", value),
            Arg::Num(value) => f.write_str(&format_number(*value, self.writer.digits)),
            Arg::Word(word) => match self.writer.dialect {
                Dialect::Tcl => f.write_str(word),
                Dialect::Python => write!(f, "'{}'", word.replace('\\', "\\\\").replace('\'', "\\'")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0.0, 10), "0.0");
        assert_eq!(format_number(-0.0, 10), "0.0");
        assert_eq!(format_number(3.0, 10), "3.0");
        assert_eq!(format_number(-1000.0, 10), "-1000.0");
        assert_eq!(format_number(0.01, 10), "0.01");
        assert_eq!(format_number(200e9, 10), "200000000000.0");
        assert_eq!(format_number(1.0 / 3.0, 10), "0.3333333333");
        assert_eq!(format_number(1.0 / 3.0, 12), "0.333333333333");
        assert_eq!(format_number(2.5e15, 10), "2.5e15");
        assert_eq!(format_number(1e-6, 10), "1e-6");
        assert_eq!(format_number(8.33e-6, 10), "8.33e-6");
    }

    #[test]
    fn test_rounding_removes_float_noise() {
        assert_eq!(format_number(0.1 + 0.2, 10), "0.3");
        assert_eq!(format_number(0.1 + 0.2, 17), "0.30000000000000004");
    }

    #[test]
    fn test_command_rendering() {
        let args = args![3u64, "Elastic", 2.0, -1.5];
        let tcl = CommandWriter::new(Dialect::Tcl, 10);
        let py = CommandWriter::new(Dialect::Python, 12);
        assert_eq!(tcl.command("uniaxialMaterial", &args), "uniaxialMaterial 3 Elastic 2.0 -1.5");
        assert_eq!(py.command("uniaxialMaterial", &args), "ops.uniaxialMaterial(3, 'Elastic', 2.0, -1.5)");
        assert_eq!(py.command("wipe", &[]), "ops.wipe()");
    }

    #[test]
    fn test_pattern_blocks() {
        let tcl = CommandWriter::new(Dialect::Tcl, 10);
        let py = CommandWriter::new(Dialect::Python, 12);
        assert_eq!(tcl.pattern_open(2, 2), "pattern Plain 2 2 {");
        assert_eq!(tcl.pattern_close().as_deref(), Some("}"));
        assert_eq!(py.pattern_open(2, 2), "ops.pattern('Plain', 2, 2)");
        assert!(py.pattern_close().is_none());
    }
}
