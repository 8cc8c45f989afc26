use std::collections::HashMap;
use std::fmt::Write;

/// A set of key-value pairs attached to a sample.
///
/// Callers pass `Option<&LabelSet>`, `None` and an empty set are the same
/// label combination.
pub type LabelSet = HashMap<String, String>;

fn sorted(labels: Option<&LabelSet>) -> Vec<(&str, &str)> {
    let mut pairs = labels
        .map(|labels| {
            labels
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    pairs.sort_unstable();
    pairs
}

/// Returns the internal lookup key of a label set, `key1=value1,key2=value2`
/// with keys sorted lexicographically. `\`, `,` and `=` inside keys and
/// values are backslash escaped, so distinct sets never share a key.
///
/// `None` and the empty set both map to the empty string.
pub fn canonicalize(labels: Option<&LabelSet>) -> String {
    sorted(labels)
        .into_iter()
        .fold(String::new(), |mut acc, (k, v)| {
            if !acc.is_empty() {
                acc.push(',');
            }

            escape_key_part(&mut acc, k);
            acc.push('=');
            escape_key_part(&mut acc, v);
            acc
        })
}

fn escape_key_part(buf: &mut String, part: &str) {
    for c in part.chars() {
        if matches!(c, '\\' | ',' | '=') {
            buf.push('\\');
        }

        buf.push(c);
    }
}

/// Renders the label body of a sample line, `key1="value1",key2="value2"`,
/// in the same order as `canonicalize`.
pub fn format_labels(labels: Option<&LabelSet>) -> String {
    let mut buf = String::new();

    for (k, v) in sorted(labels) {
        if !buf.is_empty() {
            buf.push(',');
        }

        // writing into a String never fails
        let _ = write!(buf, "{}=\"", k);
        escape_value(&mut buf, v);
        buf.push('"');
    }

    buf
}

/// Escapes HELP text, `\` and newlines.
pub(crate) fn escape_help(buf: &mut String, help: &str) {
    for c in help.chars() {
        match c {
            '\\' => buf.push_str("\\\\"),
            '\n' => buf.push_str("\\n"),
            c => buf.push(c),
        }
    }
}

fn escape_value(buf: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => buf.push_str("\\\\"),
            '"' => buf.push_str("\\\""),
            '\n' => buf.push_str("\\n"),
            c => buf.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn nil_and_empty_are_equivalent() {
        let empty = LabelSet::new();

        assert_eq!(canonicalize(None), "");
        assert_eq!(canonicalize(Some(&empty)), "");
        assert_eq!(format_labels(None), "");
        assert_eq!(format_labels(Some(&empty)), "");
    }

    #[test]
    fn order_independent() {
        let a = labels(&[("pid", "123"), ("data_host", "host1"), ("a", "b")]);

        let mut b = LabelSet::with_capacity(16);
        b.insert("a".to_string(), "b".to_string());
        b.insert("data_host".to_string(), "host1".to_string());
        b.insert("pid".to_string(), "123".to_string());

        assert_eq!(canonicalize(Some(&a)), "a=b,data_host=host1,pid=123");
        assert_eq!(canonicalize(Some(&a)), canonicalize(Some(&b)));
        assert_eq!(format_labels(Some(&a)), format_labels(Some(&b)));
    }

    #[test]
    fn format() {
        let tests = [
            (labels(&[("host", "myhost")]), r#"host="myhost""#),
            (
                labels(&[("pid", "123"), ("data_host", "host0")]),
                r#"data_host="host0",pid="123""#,
            ),
            (labels(&[("path", r"C:\tmp")]), r#"path="C:\\tmp""#),
            (labels(&[("msg", "say \"hi\"\n")]), r#"msg="say \"hi\"\n""#),
        ];

        for (input, want) in tests {
            assert_eq!(format_labels(Some(&input)), want, "input: {input:?}");
        }
    }

    #[test]
    fn separators_in_values_do_not_collide() {
        let tests = [
            (labels(&[("a", "b,c=d")]), labels(&[("a", "b"), ("c", "d")])),
            (labels(&[("a=b", "c")]), labels(&[("a", "b=c")])),
            (labels(&[("a", "b\\")]), labels(&[("a", "b\\\\")])),
        ];

        for (one, two) in tests {
            assert_ne!(
                canonicalize(Some(&one)),
                canonicalize(Some(&two)),
                "{one:?} vs {two:?}"
            );
        }

        assert_eq!(
            canonicalize(Some(&labels(&[("a", "b,c=d")]))),
            r"a=b\,c\=d"
        );
    }

    #[test]
    fn help_escaping() {
        let mut buf = String::new();
        escape_help(&mut buf, "line one\nC:\\tmp \"quoted\"");

        assert_eq!(buf, r#"line one\nC:\\tmp "quoted""#);
    }

    #[test]
    fn no_validation() {
        // reserved or odd names are accepted as they are
        let input = labels(&[("__name__", "x"), ("", "empty")]);

        assert_eq!(canonicalize(Some(&input)), "=empty,__name__=x");
    }
}
