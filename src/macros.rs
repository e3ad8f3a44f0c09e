#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Build a [`RuleSpec`](crate::RuleSpec) with Perl-flavored keys:
///
/// ```
/// use textrules::rule;
///
/// let spec = rule!(
///     name: "error_counter",
///     if: "$1 eq \"ERROR:\"",
///     do: "~errors++",
///     dont_record: true,
/// );
/// assert_eq!(spec.name.as_deref(), Some("error_counter"));
/// ```
///
/// Recognized keys: `name`, `if`, `do`, `dont_record`, `continue_to_next`,
/// `before`, `after`, `add_precondition`, `prepend_to_do`, `append_to_do`.
#[macro_export]
macro_rules! rule {
    (@set $spec:ident, name: $v:expr) => { $spec.name = Some(($v).to_string()); };
    (@set $spec:ident, if: $v:expr) => { $spec.condition = Some(($v).to_string()); };
    (@set $spec:ident, do: $v:expr) => { $spec.action = Some(($v).to_string()); };
    (@set $spec:ident, dont_record: $v:expr) => { $spec.dont_record = Some($v); };
    (@set $spec:ident, continue_to_next: $v:expr) => { $spec.continue_to_next = Some($v); };
    (@set $spec:ident, before: $v:expr) => { $spec.before = Some(($v).to_string()); };
    (@set $spec:ident, after: $v:expr) => { $spec.after = Some(($v).to_string()); };
    (@set $spec:ident, add_precondition: $v:expr) => { $spec.add_precondition = Some(($v).to_string()); };
    (@set $spec:ident, prepend_to_do: $v:expr) => { $spec.prepend_to_do = Some(($v).to_string()); };
    (@set $spec:ident, append_to_do: $v:expr) => { $spec.append_to_do = Some(($v).to_string()); };
    ( $( $key:tt : $val:expr ),* $(,)? ) => {{
        #[allow(unused_mut)]
        let mut spec = $crate::RuleSpec::default();
        $( $crate::rule!(@set spec, $key: $val); )*
        spec
    }};
}
