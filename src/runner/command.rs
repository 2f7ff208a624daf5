//! Command templating for compile and run commands

use std::path::Path;

/// Values substituted into command templates
#[derive(Debug, Clone, Default)]
pub struct Placeholders<'a> {
    pub path: &'a str,
    pub srcfile: &'a str,
    pub binfile: &'a str,
    pub infile: &'a str,
    pub outfile: &'a str,
}

/// Substitute `{path}`, `{srcfile}`, `{binfile}`, `{infile}` and `{outfile}`.
/// Values are shell-quoted; unknown braces are left alone.
pub fn render(template: &str, values: &Placeholders<'_>) -> String {
    template
        .replace("{path}", &shell_quote(values.path))
        .replace("{srcfile}", &shell_quote(values.srcfile))
        .replace("{binfile}", &shell_quote(values.binfile))
        .replace("{infile}", &shell_quote(values.infile))
        .replace("{outfile}", &shell_quote(values.outfile))
}

/// Run command followed by the rendered test arguments
pub fn run_command(run_template: &str, argv: Option<&str>, values: &Placeholders<'_>) -> String {
    let mut cmd = render(run_template, values);
    if let Some(args) = argv.map(str::trim).filter(|a| !a.is_empty()) {
        cmd.push(' ');
        cmd.push_str(&render(args, values));
    }
    cmd
}

/// Quote a string for POSIX `sh`
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-'))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Reduce a user-supplied filename to its final component
pub fn plain_file_name(name: &str) -> Option<&str> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| *n == name)
}
