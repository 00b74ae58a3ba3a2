//! Rendering tests: templates executed through a `Set` backed by an
//! in-memory loader.

use rstest::rstest;
use stencil_kernel::{
    Func, InMemLoader, Param, Record, RecordType, RuntimeError, RuntimeReason, Set, SetBuilder,
    Signature, Value, VarMap,
};

fn builder(files: &[(&str, &str)]) -> SetBuilder {
    let loader = InMemLoader::new();
    for (path, source) in files {
        loader.set(path, *source).unwrap();
    }
    Set::builder(loader)
}

fn set_with(files: &[(&str, &str)]) -> Set {
    builder(files).build().unwrap()
}

fn run(set: &Set, source: &str, vars: &VarMap, context: Value) -> Result<String, RuntimeError> {
    let template = set
        .parse("/test.jet", source)
        .unwrap_or_else(|e| panic!("{source:?} failed to load: {e}"));
    let mut out = Vec::new();
    set.execute(&template, &mut out, vars, context)?;
    Ok(String::from_utf8(out).unwrap())
}

fn render(source: &str, context: Value) -> String {
    run(&set_with(&[]), source, &VarMap::new(), context)
        .unwrap_or_else(|e| panic!("{source:?} failed: {e}"))
}

fn render_err(source: &str, context: Value) -> RuntimeError {
    match run(&set_with(&[]), source, &VarMap::new(), context) {
        Ok(out) => panic!("{source:?} rendered {out:?}, expected an error"),
        Err(err) => err,
    }
}

fn user_type() -> std::sync::Arc<RecordType> {
    RecordType::builder("User")
        .field("Name")
        .field("password")
        .method("Greet", Signature::new([Param::String]), |rec, args| {
            let name = rec.get("Name").cloned().unwrap_or_default();
            Ok(Value::String(format!("{}, {name}", args[0])))
        })
        .build()
}

// =============================================================================
// END TO END
// =============================================================================

#[test]
fn hello_variable() {
    let vars = VarMap::new().with("name", "World");
    let out = run(&set_with(&[]), "Hello {{ name }}!", &vars, Value::Null).unwrap();
    assert_eq!(out, "Hello World!");
}

#[rstest]
#[case(20, "adult")]
#[case(10, "minor")]
fn if_else_on_variable(#[case] age: i64, #[case] expected: &str) {
    let vars = VarMap::new().with("age", age);
    let source = "{{ if age >= 18 }}adult{{ else }}minor{{ end }}";
    assert_eq!(run(&set_with(&[]), source, &vars, Value::Null).unwrap(), expected);
}

#[rstest]
#[case(30, "adult")]
#[case(18, "adult")]
#[case(12, "minor")]
fn if_else_on_context(#[case] age: i64, #[case] expected: &str) {
    let source = "{{ if .Age >= 18 }}adult{{ else }}minor{{ end }}";
    assert_eq!(render(source, Value::map([("Age", age)])), expected);
}

#[test]
fn range_over_list() {
    let context = Value::map([("Items", Value::list([1, 2, 3]))]);
    assert_eq!(render("{{ range .Items }}{{ . }},{{ end }}", context), "1,2,3,");
}

#[test]
fn declare_then_assign() {
    assert_eq!(render("{{ x := 1 }}{{ x = x + 1 }}{{ x }}", Value::Null), "2");
}

#[test]
fn child_overrides_parent_block() {
    let set = set_with(&[
        ("/base.jet", "{{ yield greeting() }}!"),
        ("/child.jet", "{{ extends \"base\" }}{{ block greeting() }}Hi{{ end }}"),
    ]);
    let out = set.render("child", &VarMap::new(), Value::Null).unwrap();
    assert_eq!(out, "Hi!");
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

#[rstest]
#[case::float_promotion("{{ 4 * 1.25 }}", "5")]
#[case::int_division("{{ 5 / 2 }}", "2")]
#[case::modulo("{{ 7 % 3 }}", "1")]
#[case::precedence("{{ 1 + 2 * 3 }}", "7")]
#[case::grouping("{{ (1 + 2) * 3 }}", "9")]
#[case::unary_minus("{{ -3 + 1 }}", "-2")]
#[case::float_sum("{{ 0.5 + 1 }}", "1.5")]
#[case::concat("{{ \"a\" + 1 }}", "a1")]
#[case::cross_family_eq("{{ 1 == 1.0 }}", "true")]
#[case::string_ne("{{ \"a\" != \"b\" }}", "true")]
#[case::list_eq("{{ slice(1, 2) == slice(1, 2) }}", "true")]
#[case::logic("{{ 2 > 1 && !false }}", "true")]
#[case::word_logic("{{ false or not false }}", "true")]
#[case::ternary("{{ 1 > 2 ? \"y\" : \"n\" }}", "n")]
#[case::nil_prints_nothing("[{{ nil }}]", "[]")]
#[case::index("{{ slice(\"a\", \"b\")[1] }}", "b")]
#[case::string_slice("{{ \"hello\"[1:3] }}", "el")]
#[case::len("{{ len(\"four\") }}", "4")]
fn expressions(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(render(source, Value::Null), expected);
}

#[rstest]
#[case::division_by_zero("{{ 1 / 0 }}", RuntimeReason::DivisionByZero)]
#[case::undefined("{{ nope }}", RuntimeReason::UndefinedVariable)]
#[case::undeclared("{{ y = 1 }}", RuntimeReason::UndeclaredVariable)]
#[case::bad_operands("{{ 1 - \"a\" }}", RuntimeReason::InvalidOperation)]
#[case::not_callable("{{ x := 1 }}{{ x(2) }}", RuntimeReason::NotCallable)]
#[case::argument_count("{{ upper(\"a\", \"b\") }}", RuntimeReason::InvalidArgumentCount)]
#[case::argument_kind("{{ repeat(\"a\", \"b\") }}", RuntimeReason::InvalidValue)]
#[case::out_of_range("{{ slice(1)[3] }}", RuntimeReason::InvalidIndex)]
#[case::range_scalar("{{ range 3 }}{{ end }}", RuntimeReason::InvalidOperation)]
#[case::function_error("{{ repeat(\"a\", -1) }}", RuntimeReason::Function)]
fn runtime_errors(#[case] source: &str, #[case] expected: RuntimeReason) {
    assert_eq!(render_err(source, Value::Null).reason, expected);
}

#[test]
fn errors_carry_template_and_line() {
    let err = render_err("one\ntwo\n{{ nope }}", Value::Null);
    assert_eq!(err.template, "/test.jet");
    assert_eq!(err.line(), Some(3));
    assert_eq!(
        err.to_string(),
        "template: /test.jet:3: identifier \"nope\" not available in current scope"
    );
}

#[test]
fn logical_operators_short_circuit() {
    assert_eq!(render("{{ false && nope }}", Value::Null), "false");
    assert_eq!(render("{{ true || nope }}", Value::Null), "true");
}

// =============================================================================
// PIPELINES
// =============================================================================

#[rstest]
#[case::appended("{{ \"ab\" | upper }}", "AB")]
#[case::chained("{{ \" x \" | trimSpace | upper }}", "X")]
#[case::placeholder("{{ \"b\" | repeat: _, 3 }}", "bbb")]
#[case::trailing("{{ 2 | repeat: \"ab\" }}", "abab")]
#[case::call_form("{{ \"a-b\" | replace(_, \"-\", \"+\") }}", "a+b")]
fn pipelines(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(render(source, Value::Null), expected);
}

// =============================================================================
// VARIABLES AND SCOPES
// =============================================================================

#[test]
fn inner_scopes_assign_outer_variables() {
    let source = "{{ x := 1 }}{{ if true }}{{ x = 2 }}{{ y := 3 }}{{ end }}{{ x }}";
    assert_eq!(render(source, Value::Null), "2");
    let err = render_err("{{ if true }}{{ y := 3 }}{{ end }}{{ y }}", Value::Null);
    assert_eq!(err.reason, RuntimeReason::UndefinedVariable);
}

#[test]
fn if_with_initializer() {
    assert_eq!(render("{{ if n := 3; n > 2 }}{{ n }}{{ end }}", Value::Null), "3");
}

#[test]
fn vars_shadow_globals() {
    let set = builder(&[]).global("site", "Stencil").build().unwrap();
    let out = run(&set, "{{ site }}", &VarMap::new(), Value::Null).unwrap();
    assert_eq!(out, "Stencil");
    let vars = VarMap::new().with("site", "Local");
    assert_eq!(run(&set, "{{ site }}", &vars, Value::Null).unwrap(), "Local");
}

#[test]
fn globals_added_after_build_are_visible() {
    let set = set_with(&[]);
    set.add_global("answer", 42);
    assert_eq!(run(&set, "{{ answer }}", &VarMap::new(), Value::Null).unwrap(), "42");
}

#[test]
fn context_fields_can_be_assigned() {
    let context = Value::map([("A", 1)]);
    assert_eq!(render("{{ .A = 2 }}{{ .A }}", context), "2");
}

#[test]
fn nested_variable_fields_are_copied_on_write() {
    let vars = VarMap::new().with("m", Value::map([("k", "old")]));
    let source = "{{ n := m }}{{ n.k = \"new\" }}{{ m.k }}/{{ n.k }}";
    let out = run(&set_with(&[]), source, &vars, Value::Null).unwrap();
    assert_eq!(out, "old/new");
}

#[rstest]
#[case("a", "1-true")]
#[case("b", "-false")]
fn index_lookup_form(#[case] key: &str, #[case] expected: &str) {
    let vars = VarMap::new()
        .with("m", Value::map([("a", 1)]))
        .with("key", key);
    let source = "{{ v, ok := m[key] }}{{ v }}-{{ ok }}";
    assert_eq!(run(&set_with(&[]), source, &vars, Value::Null).unwrap(), expected);
}

// =============================================================================
// FIELD ACCESS
// =============================================================================

#[test]
fn missing_map_keys_are_nil() {
    assert_eq!(render("[{{ .Missing }}]", Value::map([("A", 1)])), "[]");
}

#[test]
fn lax_access_stops_at_nil() {
    let context = Value::map([("A", 1)]);
    assert_eq!(render("[{{ .User?.Name }}]", context.clone()), "[]");
    let err = render_err("{{ .User.Name }}", context);
    assert_eq!(err.reason, RuntimeReason::NilDereference);
}

#[test]
fn lax_index_on_short_list() {
    let context = Value::map([("Items", Value::list([1]))]);
    assert_eq!(render("[{{ .Items?[5] }}]", context), "[]");
}

#[test]
fn records_expose_methods_and_exported_fields() {
    let user = Value::Record(Record::new(&user_type()).with("Name", "Ada").with("password", "x"));
    assert_eq!(render("{{ .Name }}", user.clone()), "Ada");
    assert_eq!(render("{{ .Greet(\"Hello\") }}", user.clone()), "Hello, Ada");
    assert_eq!(render("{{ \"Hi\" | .Greet }}", user.clone()), "Hi, Ada");

    let err = render_err("{{ .password }}", user.clone());
    assert_eq!(err.reason, RuntimeReason::UnexportedField);
    let err = render_err("{{ .Age }}", user.clone());
    assert_eq!(err.reason, RuntimeReason::UnknownField);
    assert_eq!(render("[{{ ?.Age }}]", user), "[]");
}

// =============================================================================
// RANGE
// =============================================================================

#[test]
fn range_else_runs_when_empty() {
    let source = "{{ range .Items }}x{{ else }}empty{{ end }}";
    assert_eq!(render(source, Value::map([("Items", Value::list(Vec::<i64>::new()))])), "empty");
    assert_eq!(render(source, Value::map([("Other", 1)])), "empty");
}

#[test]
fn range_with_index_and_value() {
    let context = Value::map([("Items", Value::list(["a", "b"]))]);
    assert_eq!(
        render("{{ range i, v := .Items }}{{ i }}={{ v }};{{ end }}", context),
        "0=a;1=b;"
    );
}

#[test]
fn range_over_map_keeps_order() {
    let context = Value::map([("M", Value::map([("z", 1), ("a", 2)]))]);
    assert_eq!(
        render("{{ range k, v := .M }}{{ k }}{{ v }} {{ end }}", context),
        "z1 a2 "
    );
}

#[test]
fn range_over_ints() {
    assert_eq!(render("{{ range i := ints(1, 4) }}{{ i }}{{ end }}", Value::Null), "123");
}

#[test]
fn range_restores_context() {
    let context = Value::map([("Items", Value::list([1])), ("Name", Value::from("n"))]);
    assert_eq!(render("{{ range .Items }}{{ . }}{{ end }}{{ .Name }}", context), "1n");
}

// =============================================================================
// BLOCKS, YIELD AND CONTENT
// =============================================================================

#[test]
fn blocks_render_where_declared() {
    let source = "<{{ block greet(name=\"you\") }}Hi {{ name }}{{ end }}>{{ yield greet(name=\"Ada\") }}";
    assert_eq!(render(source, Value::Null), "<Hi you>Hi Ada");
}

#[test]
fn positional_yield_arguments() {
    let source = "{{ block pair(a, b=2) }}{{ a }}{{ b }}{{ end }}|{{ yield pair(7) }}|{{ yield pair(8, 9) }}";
    assert_eq!(render(source, Value::Null), "false2|72|89");
}

#[test]
fn too_many_yield_arguments() {
    let err = render_err("{{ block one(a) }}{{ end }}{{ yield one(1, 2) }}", Value::Null);
    assert_eq!(err.reason, RuntimeReason::InvalidArgumentCount);
}

#[test]
fn unknown_block() {
    let err = render_err("{{ yield missing() }}", Value::Null);
    assert_eq!(err.reason, RuntimeReason::UndefinedBlock);
}

#[test]
fn yield_with_context() {
    let set = set_with(&[("/lib.jet", "{{ block row() }}<{{ . }}>{{ end }}")]);
    let source = "{{ import \"lib\" }}{{ yield row() .Name }}{{ .Name }}";
    let out = run(&set, source, &VarMap::new(), Value::map([("Name", "n")])).unwrap();
    assert_eq!(out, "<n>n");
}

#[test]
fn content_runs_in_the_callers_scope() {
    let set = set_with(&[("/lib.jet", "{{ block card() }}<{{ yield content }}>{{ end }}")]);
    let source = "{{ import \"lib\" }}{{ x := \"outer\" }}{{ yield card() content }}{{ x }}{{ end }}";
    assert_eq!(run(&set, source, &VarMap::new(), Value::Null).unwrap(), "<outer>");
}

#[test]
fn declared_content_is_the_default() {
    let source = "{{ block card() }}<{{ yield content }}>{{ content }}default{{ end }}|{{ yield card() content }}mine{{ end }}";
    assert_eq!(render(source, Value::Null), "<default>|<mine>");
}

#[test]
fn yield_content_without_content_is_empty() {
    let set = set_with(&[("/lib.jet", "{{ block wrap() }}[{{ yield content }}]{{ end }}")]);
    let source = "{{ import \"lib\" }}{{ yield wrap() }}";
    assert_eq!(run(&set, source, &VarMap::new(), Value::Null).unwrap(), "[]");
}

#[test]
fn recursion_is_bounded_and_not_catchable() {
    let set = builder(&[]).max_depth(8).build().unwrap();
    let source = "{{ try }}{{ block r() }}{{ yield r() }}{{ end }}{{ catch }}caught{{ end }}";
    let err = run(&set, source, &VarMap::new(), Value::Null).unwrap_err();
    assert_eq!(err.reason, RuntimeReason::RecursionLimit);
}

#[test]
fn bounded_recursion_terminates() {
    let source = "{{ block count(n) }}{{ n }}{{ if n > 0 }}{{ yield count(n - 1) }}{{ end }}{{ end }}";
    let set = set_with(&[("/lib.jet", source)]);
    let out = run(&set, "{{ import \"lib\" }}{{ yield count(3) }}", &VarMap::new(), Value::Null).unwrap();
    assert_eq!(out, "3210");
}

// =============================================================================
// TRY, CATCH AND RETURN
// =============================================================================

#[test]
fn try_discards_partial_output() {
    assert_eq!(render("a{{ try }}b{{ nope }}{{ end }}c", Value::Null), "ac");
    assert_eq!(
        render("{{ try }}before{{ nope }}{{ catch }}caught{{ end }}", Value::Null),
        "caught"
    );
    assert_eq!(render("{{ try }}fine{{ catch }}caught{{ end }}", Value::Null), "fine");
}

#[test]
fn caught_errors_are_records() {
    let source = "{{ try }}\n{{ 1 / 0 }}{{ catch err }}{{ err }}|{{ err.Reason }}|{{ err.Line }}{{ end }}";
    assert_eq!(render(source, Value::Null), "integer divide by zero|division by zero|2");
}

#[test]
fn catch_binding_is_scoped() {
    let err = render_err("{{ try }}{{ nope }}{{ catch e }}{{ end }}{{ e }}", Value::Null);
    assert_eq!(err.reason, RuntimeReason::UndefinedVariable);
}

#[test]
fn return_stops_the_template() {
    let set = set_with(&[]);
    let template = set.parse("/calc.jet", "a{{ return 42 }}b").unwrap();
    let mut out = Vec::new();
    let value = set
        .execute(&template, &mut out, &VarMap::new(), Value::Null)
        .unwrap();
    assert_eq!(value, Some(Value::Int(42)));
    assert_eq!(out, b"a");
}

#[rstest]
#[case::nil_skips_the_rest_of_the_iteration("nil", "0,12,3,after")]
#[case::value_ends_the_loop("5", "0,1")]
fn return_inside_range(#[case] returned: &str, #[case] expected: &str) {
    let source = format!(
        "{{{{ range i := ints(0, 4) }}}}{{{{ i }}}}{{{{ if i == 1 }}}}{{{{ return {returned} }}}}{{{{ end }}}},{{{{ end }}}}after"
    );
    assert_eq!(render(&source, Value::Null), expected);
}

#[test]
fn return_inside_a_block_only_ends_the_block() {
    assert_eq!(render("{{ block b() }}x{{ return 1 }}y{{ end }}z", Value::Null), "xz");
}

#[test]
fn exec_returns_the_template_value() {
    let set = set_with(&[("/calc.jet", "ignored {{ return . * 10 }}")]);
    let out = run(&set, "{{ x := exec(\"calc\", 2) }}{{ x }}", &VarMap::new(), Value::Null).unwrap();
    assert_eq!(out, "ignored 20");
}

// =============================================================================
// INCLUDE
// =============================================================================

#[test]
fn include_with_context() {
    let set = set_with(&[("/views/part.jet", "[{{ . }}]"), ("/views/page.jet", "{{ include \"part\" .Name }}")]);
    let out = set
        .render("views/page", &VarMap::new(), Value::map([("Name", "n")]))
        .unwrap();
    assert_eq!(out, "[n]");
}

#[test]
fn include_sees_its_own_blocks() {
    let set = set_with(&[
        ("/base.jet", "({{ yield body() }})"),
        ("/part.jet", "{{ extends \"base\" }}{{ block body() }}part{{ end }}"),
    ]);
    assert_eq!(run(&set, "{{ include \"part\" }}", &VarMap::new(), Value::Null).unwrap(), "(part)");
}

#[test]
fn include_does_not_see_the_callers_content() {
    let set = set_with(&[
        ("/lib.jet", "{{ block card() }}<{{ include \"part\" }}|{{ yield content }}>{{ end }}"),
        ("/part.jet", "({{ yield content }})"),
    ]);
    let source = "{{ import \"lib\" }}{{ yield card() content }}X{{ end }}";
    assert_eq!(run(&set, source, &VarMap::new(), Value::Null).unwrap(), "<()|X>");
}

#[test]
fn include_if_exists_is_quiet() {
    let set = set_with(&[("/here.jet", "here")]);
    let source = "{{ includeIfExists(\"missing\") }}|{{ includeIfExists(\"here\") }}";
    assert_eq!(run(&set, source, &VarMap::new(), Value::Null).unwrap(), "|here");
}

#[test]
fn missing_include_is_an_error() {
    let err = render_err("{{ include \"missing\" }}", Value::Null);
    assert_eq!(err.reason, RuntimeReason::Include);
}

// =============================================================================
// ESCAPING AND WRITERS
// =============================================================================

#[test]
fn values_are_html_escaped_but_text_is_not() {
    assert_eq!(render("<p>{{ . }}</p>", Value::from("<b>")), "<p>&lt;b&gt;</p>");
}

#[rstest]
#[case::raw_pipe("{{ . | raw }}", "<b>")]
#[case::raw_call("{{ raw(.) }}", "<b>")]
#[case::unsafe_writer("{{ . | unsafe }}", "<b>")]
#[case::safe_html("{{ . | safeHtml }}", "&lt;b&gt;")]
fn safe_writers(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(render(source, Value::from("<b>")), expected);
}

#[test]
fn safe_writer_must_end_the_pipeline() {
    let err = render_err("{{ . | raw | upper }}", Value::from("x"));
    assert_eq!(err.reason, RuntimeReason::Structural);
    assert!(err.message.contains("last command"));
}

#[test]
fn sets_without_escaper_write_verbatim() {
    let set = builder(&[]).escaper(None).build().unwrap();
    assert_eq!(run(&set, "{{ . }}", &VarMap::new(), Value::from("<b>")).unwrap(), "<b>");
}

#[test]
fn write_json_is_not_escaped() {
    let context = Value::map([("a", "<b>")]);
    assert_eq!(render("{{ writeJson(.) }}", context), "{\"a\":\"<b>\"}");
}

#[test]
fn isset_treats_failures_as_unset() {
    let context = Value::map([("A", 1)]);
    assert_eq!(render("{{ isset(.A) }} {{ isset(.B) }} {{ isset(nope) }}", context), "true false false");
}

#[test]
fn custom_delimiters() {
    let set = builder(&[]).delimiters("[[", "]]").build().unwrap();
    let out = run(&set, "[[ .X ]] {{ y }}", &VarMap::new(), Value::map([("X", 1)])).unwrap();
    assert_eq!(out, "1 {{ y }}");
}

// =============================================================================
// HOST FUNCTIONS
// =============================================================================

#[test]
fn host_function_errors_name_the_function() {
    let fail = Func::typed(
        "fail",
        Signature::new([]),
        |_: Vec<Value>| -> anyhow::Result<Value> { anyhow::bail!("bad input") },
    );
    let set = builder(&[]).global("fail", fail).build().unwrap();
    let err = run(&set, "{{ fail() }}", &VarMap::new(), Value::Null).unwrap_err();
    assert_eq!(err.reason, RuntimeReason::Function);
    assert_eq!(err.message, "fail: bad input");
}

#[test]
fn host_functions_can_bind_variables() {
    let remember = Func::raw("remember", |args| {
        args.expect_count(1, 1)?;
        let value = args.get(0)?;
        args.runtime().set_or_let("seen", value);
        Ok(Value::Null)
    });
    let set = builder(&[]).global("remember", remember).build().unwrap();
    let run_with = |source: &str| run(&set, source, &VarMap::new(), Value::Null).unwrap();

    // Updates the outer binding instead of shadowing it.
    let source = "{{ seen := 0 }}{{ if true }}{{ remember(1) }}{{ end }}{{ seen }}";
    assert_eq!(run_with(source), "1");
    // Binds in the current scope when nothing does yet.
    assert_eq!(run_with("{{ remember(2) }}{{ seen }}"), "2");
    let source = "{{ if true }}{{ remember(3) }}{{ end }}{{ seen }}";
    let err = run(&set, source, &VarMap::new(), Value::Null).unwrap_err();
    assert_eq!(err.reason, RuntimeReason::UndefinedVariable);
}

#[test]
fn panics_become_errors_and_the_set_stays_usable() {
    let boom = Func::typed(
        "boom",
        Signature::new([]),
        |_: Vec<Value>| -> anyhow::Result<Value> { panic!("boom") },
    );
    let set = builder(&[]).global("boom", boom).build().unwrap();
    let err = run(&set, "{{ boom() }}", &VarMap::new(), Value::Null).unwrap_err();
    assert_eq!(err.reason, RuntimeReason::Panic);
    assert_eq!(err.message, "boom");
    assert_eq!(run(&set, "ok", &VarMap::new(), Value::Null).unwrap(), "ok");
}

#[test]
fn records_can_render_themselves() {
    let badge = RecordType::builder("Badge")
        .field("Label")
        .render(|record, rt| {
            rt.write(b"<span>")?;
            let label = record.get("Label").cloned().unwrap_or_default();
            rt.write_value(&label)?;
            rt.write(b"</span>")
        })
        .build();
    let value = Value::Record(Record::new(&badge).with("Label", "a&b"));
    assert_eq!(render("{{ . }}", value), "<span>a&amp;b</span>");
}
