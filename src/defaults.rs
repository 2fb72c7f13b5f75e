use std::collections::BTreeMap;
use std::sync::Arc;

use crate::filters::{make_filter, make_pure_filter};
use crate::tests::make_test;
use crate::utils::AutoEscape;
use crate::value::{Callable, CallableKind, Value, ValueRepr};
use crate::{filters, functions, tests};

pub(crate) fn no_auto_escape(_: &str) -> AutoEscape {
    AutoEscape::None
}

/// The default logic for auto escaping based on file extension.
///
/// * [`Html`](AutoEscape::Html): `.html`, `.htm`, `.xml`
/// * [`None`](AutoEscape::None): _all others_
pub fn default_auto_escape_callback(name: &str) -> AutoEscape {
    match name.rsplit('.').next() {
        Some("html" | "htm" | "xml") => AutoEscape::Html,
        _ => AutoEscape::None,
    }
}

/// Returns true if a name identifies a builtin filter.
///
/// This is the static fast path the optimizer consults before taking the
/// dynamic registry into account.
pub(crate) fn is_builtin_filter(name: &str) -> bool {
    matches!(
        name,
        "safe"
            | "escape"
            | "e"
            | "lower"
            | "upper"
            | "title"
            | "capitalize"
            | "replace"
            | "length"
            | "count"
            | "dictsort"
            | "items"
            | "reverse"
            | "trim"
            | "join"
            | "split"
            | "lines"
            | "default"
            | "d"
            | "round"
            | "abs"
            | "attr"
            | "first"
            | "last"
            | "min"
            | "max"
            | "sum"
            | "unique"
            | "sort"
            | "list"
            | "bool"
            | "int"
            | "float"
            | "string"
            | "batch"
            | "slice"
            | "indent"
            | "truncate"
            | "wordcount"
            | "select"
            | "reject"
            | "selectattr"
            | "rejectattr"
            | "map"
            | "groupby"
            | "tojson"
            | "urlencode"
    )
}

pub(crate) fn get_builtin_filters() -> BTreeMap<Arc<str>, Value> {
    let mut rv = BTreeMap::new();
    rv.insert(Arc::from("safe"), make_filter("safe", filters::safe));
    let escape = make_filter("escape", filters::escape);
    rv.insert(Arc::from("escape"), escape.clone());
    rv.insert(Arc::from("e"), escape);
    rv.insert(Arc::from("lower"), make_pure_filter("lower", filters::lower));
    rv.insert(Arc::from("upper"), make_pure_filter("upper", filters::upper));
    rv.insert(Arc::from("title"), make_pure_filter("title", filters::title));
    rv.insert(
        Arc::from("capitalize"),
        make_pure_filter("capitalize", filters::capitalize),
    );
    rv.insert(
        Arc::from("replace"),
        make_pure_filter("replace", filters::replace),
    );
    let length = make_pure_filter("length", filters::length);
    rv.insert(Arc::from("length"), length.clone());
    rv.insert(Arc::from("count"), length);
    rv.insert(Arc::from("dictsort"), make_filter("dictsort", filters::dictsort));
    rv.insert(Arc::from("items"), make_filter("items", filters::items));
    rv.insert(
        Arc::from("reverse"),
        make_pure_filter("reverse", filters::reverse),
    );
    rv.insert(Arc::from("trim"), make_pure_filter("trim", filters::trim));
    rv.insert(Arc::from("join"), make_pure_filter("join", filters::join));
    rv.insert(Arc::from("split"), make_pure_filter("split", filters::split));
    rv.insert(Arc::from("lines"), make_pure_filter("lines", filters::lines));
    let default = make_filter("default", filters::default);
    rv.insert(Arc::from("default"), default.clone());
    rv.insert(Arc::from("d"), default);
    rv.insert(Arc::from("round"), make_pure_filter("round", filters::round));
    rv.insert(Arc::from("abs"), make_pure_filter("abs", filters::abs));
    rv.insert(Arc::from("attr"), make_filter("attr", filters::attr));
    rv.insert(Arc::from("first"), make_filter("first", filters::first));
    rv.insert(Arc::from("last"), make_filter("last", filters::last));
    rv.insert(Arc::from("min"), make_filter("min", filters::min));
    rv.insert(Arc::from("max"), make_filter("max", filters::max));
    rv.insert(Arc::from("sum"), make_filter("sum", filters::sum));
    rv.insert(Arc::from("unique"), make_filter("unique", filters::unique));
    rv.insert(Arc::from("sort"), make_filter("sort", filters::sort));
    rv.insert(Arc::from("list"), make_filter("list", filters::list));
    rv.insert(Arc::from("bool"), make_pure_filter("bool", filters::bool));
    rv.insert(Arc::from("int"), make_pure_filter("int", filters::int));
    rv.insert(Arc::from("float"), make_pure_filter("float", filters::float));
    rv.insert(
        Arc::from("string"),
        make_pure_filter("string", filters::string),
    );
    rv.insert(Arc::from("batch"), make_filter("batch", filters::batch));
    rv.insert(Arc::from("slice"), make_filter("slice", filters::slice));
    rv.insert(Arc::from("indent"), make_pure_filter("indent", filters::indent));
    rv.insert(
        Arc::from("truncate"),
        make_pure_filter("truncate", filters::truncate),
    );
    rv.insert(
        Arc::from("wordcount"),
        make_pure_filter("wordcount", filters::wordcount),
    );
    rv.insert(Arc::from("select"), make_filter("select", filters::select));
    rv.insert(Arc::from("reject"), make_filter("reject", filters::reject));
    rv.insert(
        Arc::from("selectattr"),
        make_filter("selectattr", filters::selectattr),
    );
    rv.insert(
        Arc::from("rejectattr"),
        make_filter("rejectattr", filters::rejectattr),
    );
    rv.insert(Arc::from("map"), make_filter("map", filters::map));
    rv.insert(Arc::from("groupby"), make_filter("groupby", filters::groupby));
    rv.insert(Arc::from("tojson"), make_filter("tojson", filters::tojson));
    rv.insert(
        Arc::from("urlencode"),
        make_pure_filter("urlencode", filters::urlencode),
    );
    rv
}

pub(crate) fn get_builtin_tests() -> BTreeMap<Arc<str>, Value> {
    let mut rv = BTreeMap::new();
    rv.insert(Arc::from("undefined"), make_test("undefined", tests::is_undefined));
    rv.insert(Arc::from("defined"), make_test("defined", tests::is_defined));
    rv.insert(Arc::from("none"), make_test("none", tests::is_none));
    let is_safe = make_test("safe", tests::is_safe);
    rv.insert(Arc::from("safe"), is_safe.clone());
    rv.insert(Arc::from("escaped"), is_safe);
    rv.insert(Arc::from("odd"), make_test("odd", tests::is_odd));
    rv.insert(Arc::from("even"), make_test("even", tests::is_even));
    rv.insert(
        Arc::from("divisibleby"),
        make_test("divisibleby", tests::is_divisibleby),
    );
    rv.insert(Arc::from("number"), make_test("number", tests::is_number));
    rv.insert(Arc::from("integer"), make_test("integer", tests::is_integer));
    rv.insert(Arc::from("float"), make_test("float", tests::is_float));
    rv.insert(Arc::from("string"), make_test("string", tests::is_string));
    rv.insert(Arc::from("boolean"), make_test("boolean", tests::is_boolean));
    rv.insert(Arc::from("true"), make_test("true", tests::is_true));
    rv.insert(Arc::from("false"), make_test("false", tests::is_false));
    rv.insert(Arc::from("mapping"), make_test("mapping", tests::is_mapping));
    rv.insert(Arc::from("sequence"), make_test("sequence", tests::is_sequence));
    rv.insert(Arc::from("iterable"), make_test("iterable", tests::is_iterable));
    rv.insert(Arc::from("callable"), make_test("callable", tests::is_callable));
    rv.insert(
        Arc::from("startingwith"),
        make_test("startingwith", tests::is_startingwith),
    );
    rv.insert(
        Arc::from("endingwith"),
        make_test("endingwith", tests::is_endingwith),
    );
    rv.insert(Arc::from("lower"), make_test("lower", tests::is_lower));
    rv.insert(Arc::from("upper"), make_test("upper", tests::is_upper));
    rv.insert(Arc::from("sameas"), make_test("sameas", tests::is_sameas));
    rv.insert(Arc::from("in"), make_test("in", tests::is_in));

    // operators
    let is_eq = make_test("eq", tests::is_eq);
    rv.insert(Arc::from("eq"), is_eq.clone());
    rv.insert(Arc::from("equalto"), is_eq.clone());
    rv.insert(Arc::from("=="), is_eq);
    let is_ne = make_test("ne", tests::is_ne);
    rv.insert(Arc::from("ne"), is_ne.clone());
    rv.insert(Arc::from("!="), is_ne);
    let is_lt = make_test("lt", tests::is_lt);
    rv.insert(Arc::from("lt"), is_lt.clone());
    rv.insert(Arc::from("lessthan"), is_lt.clone());
    rv.insert(Arc::from("<"), is_lt);
    let is_le = make_test("le", tests::is_le);
    rv.insert(Arc::from("le"), is_le.clone());
    rv.insert(Arc::from("<="), is_le);
    let is_gt = make_test("gt", tests::is_gt);
    rv.insert(Arc::from("gt"), is_gt.clone());
    rv.insert(Arc::from("greaterthan"), is_gt.clone());
    rv.insert(Arc::from(">"), is_gt);
    let is_ge = make_test("ge", tests::is_ge);
    rv.insert(Arc::from("ge"), is_ge.clone());
    rv.insert(Arc::from(">="), is_ge);
    rv
}

pub(crate) fn get_globals() -> BTreeMap<Arc<str>, Value> {
    let mut rv = BTreeMap::new();
    rv.insert(
        Arc::from("range"),
        Value(ValueRepr::Callable(Arc::new(Callable::new_native(
            "range",
            CallableKind::Function,
            functions::range,
        )))),
    );
    rv.insert(
        Arc::from("dict"),
        Value(ValueRepr::Callable(Arc::new(Callable::new_native(
            "dict",
            CallableKind::Function,
            functions::dict,
        )))),
    );
    rv.insert(
        Arc::from("debug"),
        Value(ValueRepr::Callable(Arc::new(Callable::new_native(
            "debug",
            CallableKind::Function,
            functions::debug,
        )))),
    );
    rv.insert(
        Arc::from("namespace"),
        Value(ValueRepr::Callable(Arc::new(Callable::new_native(
            "namespace",
            CallableKind::Function,
            functions::namespace,
        )))),
    );
    rv
}
