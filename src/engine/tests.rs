//! End-to-end engine scenarios.
//!
//! Each test drives the whole pipeline (source -> unwrap -> dispatch ->
//! records/stash) through the public API, the way user code would.

use std::io::Cursor;

use regex::Regex;

use crate::error::Error;
use crate::expr::Value;
use crate::{LineWrapStyle, Parser, ParserClass, rule};

#[test]
fn csv_ish_extraction() {
    let mut parser = Parser::default();
    parser.set_field_separator(Regex::new(",").unwrap());
    parser.add_rule(rule!(if: "1", do: "return @{1+}")).unwrap();
    parser.read_string("a,b,c\n1,2,3\n").unwrap();
    assert_eq!(
        parser.get_records(),
        [
            Value::List(vec!["a".into(), "b".into(), "c".into()]),
            Value::List(vec!["1".into(), "2".into(), "3".into()]),
        ]
    );
}

#[test]
fn spice_unwrap_and_comment_skipping() {
    let mut parser = Parser::default();
    parser.set_line_wrap_style(LineWrapStyle::Spice);
    parser.set_auto_chomp(true);
    parser.add_rule(rule!(if: "substr($1, 0, 1) eq \"*\"", dont_record: true)).unwrap();
    parser.add_rule(rule!(if: "uc(substr($1, 0, 1)) eq \"M\"", do: "return $0")).unwrap();
    parser.read_string("* comment\nMinst net1\n+ net2 net3\n+ net4 nmos l=0.09u w=0.13u\n").unwrap();
    assert_eq!(parser.get_records(), [Value::Str("Minst net1 net2 net3 net4 nmos l=0.09u w=0.13u".into())]);
}

#[test]
fn stashed_counter_across_begin_and_end() {
    let mut parser = Parser::default();
    parser.begin_rule(rule!(do: "~c = 0")).unwrap();
    parser.add_rule(rule!(if: "$1 eq \"ERROR:\"", do: "~c++", dont_record: true)).unwrap();
    parser.end_rule(rule!(do: "return ~c")).unwrap();
    parser.read_string("ERROR: one\nfine\nERROR: two\nERROR: three\n").unwrap();
    assert_eq!(parser.last_record(), Some(&Value::Num(3.0)));
}

#[test]
fn name_and_email_extraction_with_range_shortcut() {
    let mut parser = Parser::default();
    parser.add_rule(rule!(if: "$1 eq \"NAME:\"", do: "return ${2+}")).unwrap();
    parser.add_rule(rule!(if: "$1 eq \"EMAIL:\"", do: "return $2")).unwrap();
    parser.read_string("NAME: Audrey C Miller\nEMAIL: aud@a.io\n").unwrap();
    assert_eq!(parser.get_records(), [Value::Str("Audrey C Miller".into()), Value::Str("aud@a.io".into())]);
}

#[test]
fn abort_on_first_error_line() {
    let mut parser = Parser::default();
    parser.set_auto_chomp(true);
    parser.add_rule(rule!(if: "$1 eq \"ERROR:\"", do: "abort_reading(); return $0")).unwrap();
    parser.read_string("ok 1\nERROR: boom\nERROR: later\nok 2\n").unwrap();
    assert!(parser.has_aborted());
    assert_eq!(parser.get_records(), [Value::Str("ERROR: boom".into())]);
    assert_eq!(parser.lines_parsed(), 2, "reading stopped at the aborting line");
}

#[test]
fn trailing_backslash_join() {
    let mut parser = Parser::default();
    parser.set_line_wrap_style(LineWrapStyle::TrailingBackslash);
    parser.set_auto_chomp(true);
    parser.add_rule(rule!(if: "1")).unwrap();
    parser.read_string("Garbage In.\\\nGarbage Out!\n").unwrap();
    assert_eq!(parser.get_records(), [Value::Str("Garbage In. Garbage Out!".into())]);
}

#[test]
fn unexpected_eof_propagates_from_read() {
    let mut parser = Parser::default();
    parser.set_line_wrap_style(LineWrapStyle::TrailingBackslash);
    parser.add_rule(rule!(if: "1")).unwrap();
    let err = parser.read_string("dangling \\\n").unwrap_err();
    assert!(matches!(err, Error::UnexpectedEof { nr: 1, .. }));
    assert!(!parser.has_aborted(), "errors do not set the cooperative abort flag");
}

#[test]
fn records_reset_per_read_and_prestash_survives() {
    let mut parser = Parser::default();
    parser.prestash("mode", "strict");
    parser.add_rule(rule!(if: "1", do: "~seen = $1; return $1")).unwrap();

    parser.read_string("one\n").unwrap();
    assert_eq!(parser.get_records(), [Value::Str("one".into())]);
    assert!(parser.has_stashed("mode"), "pre-stash survives the read");
    assert!(!parser.has_stashed("seen"), "transient stash is cleared after the read");

    parser.read_string("two\n").unwrap();
    assert_eq!(parser.get_records(), [Value::Str("two".into())], "records reset at the start of each read");
}

#[test]
fn transient_writes_shadow_prestash_without_clobbering_it() {
    let mut parser = Parser::default();
    parser.prestash("limit", 5.0);
    parser.add_rule(rule!(if: "$1 eq \"set\"", do: "~limit = 99", dont_record: true)).unwrap();
    parser.end_rule(rule!(do: "return ~limit")).unwrap();
    parser.read_string("set x\n").unwrap();
    assert_eq!(parser.last_record(), Some(&Value::Num(99.0)));
    assert_eq!(parser.stashed("limit"), Some(&Value::Num(5.0)), "persistent copy is untouched");

    parser.forget(&["limit"]);
    assert!(parser.has_empty_stash());
}

#[test]
fn nr_reports_the_last_physical_line_of_a_logical_line() {
    let mut parser = Parser::default();
    parser.set_line_wrap_style(LineWrapStyle::TrailingBackslash);
    parser.add_rule(rule!(if: "1", do: "return NR()")).unwrap();
    parser.read_string("a \\\nb\nc\n").unwrap();
    assert_eq!(parser.get_records(), [Value::Num(2.0), Value::Num(3.0)]);
    assert_eq!(parser.lines_parsed(), 3, "lines_parsed counts physical lines");
}

#[test]
fn slurp_emits_one_logical_line() {
    let mut parser = Parser::default();
    parser.set_line_wrap_style(LineWrapStyle::Slurp);
    parser.add_rule(rule!(if: "1", do: "return $0")).unwrap();
    let input = "a\nb\nc\n";
    parser.read_string(input).unwrap();
    assert_eq!(parser.get_records(), [Value::Str(input.into())]);
}

#[test]
fn class_rules_dispatch_before_instance_rules() {
    let base = ParserClass::define("E2EBase", &[]).unwrap();
    base.applies_rule(
        "count_errors",
        rule!(if: "$1 eq \"ERROR:\"", do: "~class_hits++", dont_record: true, continue_to_next: true),
    )
    .unwrap();

    let mut parser = Parser::of_class(&base).unwrap();
    assert!(parser.auto_split(), "registering class rules turns auto-split on for the class");
    parser.add_rule(rule!(if: "$1 eq \"ERROR:\"", do: "return $2")).unwrap();
    parser.end_rule(rule!(do: "return ~class_hits")).unwrap();
    parser.read_string("ERROR: one\nERROR: two\n").unwrap();
    assert_eq!(
        parser.get_records(),
        [Value::Str("one".into()), Value::Str("two".into()), Value::Num(2.0)]
    );
}

#[test]
fn class_level_custom_unwrap() {
    let class = ParserClass::define("E2ETilde", &[]).unwrap();
    class
        .unwraps_lines_using(
            |line| line.trim_end().ends_with('~'),
            |last, cur| format!("{}{cur}", last.trim_end().trim_end_matches('~')),
        )
        .unwrap();
    class.applies_rule("all", rule!(if: "1", do: "return $0")).unwrap();

    let mut parser = Parser::of_class(&class).unwrap();
    parser.set_auto_chomp(true);
    parser.read_string("a~\nb\nc\n").unwrap();
    assert_eq!(parser.get_records(), [Value::Str("ab".into()), Value::Str("c".into())]);
}

#[test]
fn rule_faults_abort_the_read_and_propagate() {
    let mut parser = Parser::default();
    parser.add_rule(rule!(if: "1", do: "return 1 / 0")).unwrap();
    let err = parser.read_string("x\n").unwrap_err();
    assert!(matches!(err, Error::RuleRun { nr: 1, .. }));
    assert!(!parser.has_aborted());
}

#[test]
fn short_lines_skip_rules_by_min_nf() {
    let mut parser = Parser::default();
    parser.add_rule(rule!(if: "$3 eq \"x\"", do: "return $3")).unwrap();
    parser.read_string("only two\nfields here\n").unwrap();
    assert!(parser.get_records().is_empty());
}

#[test]
fn splice_mutations_are_visible_to_later_rules_on_the_same_line() {
    let mut parser = Parser::default();
    parser
        .add_rule(rule!(if: "$1 eq \"swap\"", do: "splice_fields(0, 1)", dont_record: true, continue_to_next: true))
        .unwrap();
    parser.add_rule(rule!(if: "1", do: "return $1")).unwrap();
    parser.read_string("swap rest\nplain line\n").unwrap();
    assert_eq!(parser.get_records(), [Value::Str("rest".into()), Value::Str("plain".into())]);
}

#[test]
fn indentation_tracking() {
    let mut parser = Parser::default();
    parser.set_track_indentation(true);
    parser.add_rule(rule!(if: "1", do: "return this_indent()")).unwrap();
    parser.read_string("    deep\n  shallow\nflat\n").unwrap();
    assert_eq!(parser.get_records(), [Value::Num(4.0), Value::Num(2.0), Value::Num(0.0)]);
}

#[test]
fn filehandle_is_kept_but_never_rewound() {
    let mut parser = Parser::default();
    parser.add_rule(rule!(if: "1", do: "return $1")).unwrap();
    parser.set_filehandle(Cursor::new(b"a\nb\n".to_vec()));

    parser.read().unwrap();
    assert_eq!(parser.get_records().len(), 2);

    // The handle stays installed (the engine does not close it), so another
    // read starts from where it stopped: EOF.
    parser.read().unwrap();
    assert!(parser.get_records().is_empty());
}

#[test]
fn file_sources_reopen_per_read() {
    let mut path = std::env::temp_dir();
    path.push(format!("textrules-e2e-{}.txt", std::process::id()));
    std::fs::write(&path, "NAME: Ada Lovelace\n").unwrap();

    let mut parser = Parser::default();
    parser.add_rule(rule!(if: "$1 eq \"NAME:\"", do: "return ${2+}")).unwrap();
    parser.read_file(&path).unwrap();
    assert_eq!(parser.filename(), Some(path.as_path()));
    assert_eq!(parser.get_records(), [Value::Str("Ada Lovelace".into())]);

    // The filename selector persists; a second read re-opens from the top.
    parser.read().unwrap();
    assert_eq!(parser.get_records(), [Value::Str("Ada Lovelace".into())]);

    std::fs::remove_file(&path).ok();
}

#[test]
fn read_metrics_tally_lines_and_records() {
    let mut parser = Parser::default();
    parser.set_line_wrap_style(LineWrapStyle::TrailingBackslash);
    parser.add_rule(rule!(if: "1", do: "return $0")).unwrap();
    parser.set_filehandle(Cursor::new(b"a \\\nb\nc\n".to_vec()));
    let metrics = parser.read_with_metrics().unwrap();
    assert_eq!(metrics.physical_lines, 3);
    assert_eq!(metrics.logical_lines, 2);
    assert_eq!(metrics.records, 2);
    assert!(metrics.total >= metrics.dispatch);
}

#[test]
fn this_line_is_cleared_after_the_read() {
    let mut parser = Parser::default();
    parser.add_rule(rule!(if: "1", dont_record: true)).unwrap();
    parser.read_string("x\n").unwrap();
    assert_eq!(parser.this_line(), None);
}
