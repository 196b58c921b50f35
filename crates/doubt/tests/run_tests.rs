//! End-to-end scenarios through the public API: source text in, log
//! output and exit disposition out.

use doubt::{CollectStringLog, ErrorKind, Object, Runner, DEFAULT_INDENT};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Result<(Object, String), doubt::Exception> {
    let runner = Runner::new(source, "test.doubt", DEFAULT_INDENT).expect("source should compile");
    let mut log = CollectStringLog::new();
    let object = runner.run(&[], &mut log)?;
    Ok((object, log.into_output()))
}

fn run_output(source: &str) -> String {
    match run(source) {
        Ok((_, output)) => output,
        Err(err) => panic!("unexpected runtime error: {err}"),
    }
}

fn run_error(source: &str) -> doubt::Exception {
    match run(source) {
        Ok((_, output)) => panic!("expected a runtime error, got output {output:?}"),
        Err(err) => err,
    }
}

#[test]
fn hello_world_with_const() {
    let output = run_output("const msg = \"hi\"\nfn main() :=\n    log(msg)\n");
    assert_eq!(output, "hi\n");
}

#[test]
fn arithmetic_and_calls() {
    let output = run_output("fn add(a, b) = a + b\nfn main() :=\n    log(add(2, 3))\n");
    assert_eq!(output, "5\n");
}

#[test]
fn range_and_log() {
    let output = run_output("fn main() :=\n    log(range(1, 3))\n");
    assert!(output.contains("[1, 2, 3]"), "output: {output:?}");
}

#[test]
fn struct_instance_and_member_access() {
    let output = run_output(
        "struct Point :=\n    x\n    y\nfn main() :=\n    const p = Point {x = 10, y = 20}\n    log(p.x, p.y)\n",
    );
    assert_eq!(output, "10 20\n");
}

#[test]
fn match_selects_the_first_equal_arm() {
    let output = run_output(
        "fn main() :=\n    match 2\n        if 1 -> log(\"one\")\n        if 2 -> log(\"two\")\n        else -> log(\"other\")\n",
    );
    assert_eq!(output, "two\n");
}

#[test]
fn match_falls_back_to_else() {
    let output = run_output(
        "fn main() :=\n    match 9\n        if 1 -> log(\"one\")\n        else -> log(\"other\")\n",
    );
    assert_eq!(output, "other\n");
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let err = run_error("fn main() :=\n    log(1 / 0)\n");
    assert_eq!(err.kind, ErrorKind::Interp);
    assert!(err.message.contains("division by zero"), "message: {}", err.message);
}

#[test]
fn empty_source_parses_but_lacks_main() {
    let err = run_error("");
    assert!(err.message.contains("main"));
}

#[test]
fn comment_only_source_behaves_like_empty() {
    let err = run_error("// just a comment\n// another\n");
    assert!(err.message.contains("main"));
}

#[test]
fn block_containing_only_return_returns_the_value() {
    let output = run_output("fn f() :=\n    return 42\nfn main() :=\n    log(f())\n");
    assert_eq!(output, "42\n");
}

#[test]
fn native_arity_mismatch_names_the_native() {
    let err = run_error("fn main() :=\n    sqrt(1, 2)\n");
    assert_eq!(err.kind, ErrorKind::Native);
    assert!(err.message.contains("sqrt"), "message: {}", err.message);
}

#[test]
fn const_cannot_be_redefined_in_the_same_scope() {
    let err = run_error("fn main() :=\n    const x = 1\n    x = 2\n");
    assert!(err.message.contains("constant"), "message: {}", err.message);
}

#[test]
fn names_introduced_in_a_block_do_not_leak() {
    let err = run_error("fn main() :=\n    if 1 :=\n        y = 2\n    log(y)\n");
    assert!(err.message.contains("unknown identifier"), "message: {}", err.message);
}

#[test]
fn assignment_updates_the_enclosing_binding() {
    let output = run_output("fn main() :=\n    i = 0\n    loop (i < 3) :=\n        log(i)\n        i = i + 1\n");
    assert_eq!(output, "0\n1\n2\n");
}

#[test]
fn let_bindings_evaluate_left_to_right() {
    let output = run_output("fn main() :=\n    let (x = 1, y = x + 1) -> log(x + y)\n");
    assert_eq!(output, "3\n");
}

#[test]
fn for_collects_body_values() {
    let output = run_output(
        "fn squares(limit) :=\n    for (x <- range(1, limit)) :=\n        x * x\nfn main() :=\n    log(squares(3))\n",
    );
    assert_eq!(output, "[1, 4, 9]\n");
}

#[test]
fn take_of_range_is_a_prefix() {
    let output = run_output("fn main() :=\n    log(take(range(1, 10), 3))\n");
    assert_eq!(output, "[1, 2, 3]\n");
}

#[test]
fn generators_resume_across_yields() {
    let output = run_output(
        "loop fn three() :=\n    yield 1\n    yield 2\n    yield 3\nfn main() :=\n    log(take(three(), 5))\n",
    );
    assert_eq!(output, "[1, 2, 3]\n");
}

#[test]
fn generator_loop_carries_state_in_its_scope() {
    let output = run_output(
        "loop fn nat(start) :=\n    n = start - 1\n    loop (1) :=\n        n = n + 1\n        yield n\nfn main() :=\n    log(take(nat(1), 4))\n",
    );
    assert_eq!(output, "[1, 2, 3, 4]\n");
}

#[test]
fn statements_after_a_nested_yield_run_once_per_step() {
    // The increment sits *after* the yield inside the loop body: resumption
    // must continue past the yield, not re-enter the iteration from its top.
    let output = run_output(
        "loop fn nat2(start) :=\n    n = start\n    loop (1) :=\n        yield n\n        n = n + 1\nfn main() :=\n    log(take(nat2(5), 3))\n",
    );
    assert_eq!(output, "[5, 6, 7]\n");
}

#[test]
fn yields_nested_in_branches_resume_in_order() {
    let output = run_output(
        "loop fn stages() :=\n    yield 1\n    if 1 :=\n        yield 2\n        yield 3\n    yield 4\nfn main() :=\n    log(take(stages(), 6))\n",
    );
    assert_eq!(output, "[1, 2, 3, 4]\n");
}

#[test]
fn generator_locals_before_a_mid_body_yield_survive_resumption() {
    // The local defined before the loop must still be visible after the
    // suspended iteration resumes and finishes.
    let output = run_output(
        "loop fn pairs() :=\n    base = 10\n    loop (1) :=\n        yield base\n        base = base + base\nfn main() :=\n    log(take(pairs(), 3))\n",
    );
    assert_eq!(output, "[10, 20, 40]\n");
}

#[test]
fn anonymous_functions_are_values() {
    let output = run_output("fn main() :=\n    const f = fn(x) -> x * 2\n    log(f(21))\n");
    assert_eq!(output, "42\n");
}

#[test]
fn closures_capture_their_defining_scope() {
    let output = run_output(
        "fn make_adder(n) :=\n    fn add(x) = x + n\n    add\nfn main() :=\n    const add2 = make_adder(2)\n    log(add2(40))\n",
    );
    assert_eq!(output, "42\n");
}

#[test]
fn missing_arguments_fall_back_to_defaults() {
    let output = run_output("fn greet(name = \"world\") :=\n    log(name)\nfn main() :=\n    greet()\n");
    assert_eq!(output, "world\n");
}

#[test]
fn too_many_arguments_is_an_error() {
    let err = run_error("fn f(a) = a\nfn main() :=\n    f(1, 2)\n");
    assert!(err.message.contains("argument"), "message: {}", err.message);
}

#[test]
fn method_resolution_finds_type_qualified_functions() {
    let output = run_output(
        "struct Point :=\n    x\n    y\nfn Point_norm(p) = sqrt(p.x * p.x + p.y * p.y)\nfn main() :=\n    const p = Point {x = 3, y = 4}\n    log(p.norm())\n",
    );
    assert_eq!(output, "5.0\n");
}

#[test]
fn string_methods_resolve_through_str_natives() {
    let output = run_output("fn main() :=\n    log(\"hello\".upper())\n    log(\"  pad  \".trim())\n");
    assert_eq!(output, "HELLO\npad\n");
}

#[test]
fn string_concatenation_and_comparison() {
    let output = run_output("fn main() :=\n    log(\"ab\" + \"cd\")\n    log(\"a\" < \"b\")\n");
    assert_eq!(output, "abcd\ntrue\n");
}

#[test]
fn struct_field_defaults_apply() {
    let output = run_output(
        "struct Config :=\n    retries : Int\n    label = \"none\"\nfn main() :=\n    const c = Config {}\n    log(c.retries, c.label)\n",
    );
    assert_eq!(output, "0 none\n");
}

#[test]
fn tags_print_with_their_hash_prefix() {
    let output = run_output("fn main() :=\n    log(#MCMC)\n");
    assert_eq!(output, "#MCMC\n");
}

#[test]
fn observe_is_log_in_this_core() {
    let output = run_output("fn main() :=\n    observe(\"weight\", 70)\n");
    assert_eq!(output, "weight 70\n");
}

#[test]
fn sample_returns_numbers_unchanged() {
    let output = run_output("fn main() :=\n    log(sample(3))\n");
    assert_eq!(output, "3\n");
}

#[test]
fn sample_delegates_to_an_object_method() {
    let output = run_output(
        "struct Fixed :=\n    value\nfn Fixed_sample(d) = d.value\nfn main() :=\n    const d = Fixed {value = 7}\n    log(sample(d))\n",
    );
    assert_eq!(output, "7\n");
}

#[test]
fn infer_returns_a_sampler_take_draws_from_it() {
    let source = "fn model() = sample(normal(0.0, 1.0))\nfn main() :=\n    log(take(infer(model, #MCMC), 3))\n";
    let runner = Runner::new(source, "test.doubt", DEFAULT_INDENT).unwrap();
    let mut log = CollectStringLog::new();
    runner.run_seeded(7, &[], &mut log).unwrap();
    let output = log.into_output();
    let draws = output.trim().trim_start_matches('[').trim_end_matches(']');
    assert_eq!(draws.split(", ").count(), 3, "output: {output:?}");
}

#[test]
fn seeded_runs_are_deterministic() {
    let source = "fn main() :=\n    log(normal(0.0, 1.0), gamma(2.0, 1.0))\n";
    let mut outputs = Vec::new();
    for _ in 0..2 {
        let runner = Runner::new(source, "test.doubt", DEFAULT_INDENT).unwrap();
        let mut log = CollectStringLog::new();
        runner.run_seeded(42, &[], &mut log).unwrap();
        outputs.push(log.into_output());
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn range_step_zero_is_an_error() {
    let err = run_error("fn main() :=\n    log(range(1, 3, 0))\n");
    assert_eq!(err.kind, ErrorKind::Native);
    assert!(err.message.contains("step"));
}

#[test]
fn range_negative_step_descends() {
    let output = run_output("fn main() :=\n    log(range(3, 1, -1))\n");
    assert_eq!(output, "[3, 2, 1]\n");
}

#[test]
fn mut_is_not_implemented() {
    let err = run_error("fn main() :=\n    mut x = 3\n");
    assert_eq!(err.kind, ErrorKind::NotImplemented);
}

#[test]
fn use_reports_the_module_loader_stub() {
    let err = run_error("use std.math\nfn main() :=\n    log(1)\n");
    assert_eq!(err.kind, ErrorKind::NotImplemented);
    assert!(err.message.contains("std.math"));
}

#[test]
fn tracebacks_list_frames_deepest_first() {
    let err = run_error(
        "fn inner() :=\n    log(1 / 0)\nfn outer() :=\n    inner()\nfn main() :=\n    outer()\n",
    );
    let names: Vec<&str> = err.frames.iter().map(|f| f.function.as_str()).collect();
    assert_eq!(names, ["inner", "outer", "main"]);
    let rendered = err.to_string();
    assert!(rendered.contains("traceback (deepest first)"), "rendered: {rendered}");
}

#[test]
fn runtime_errors_carry_user_source_locations() {
    let err = run_error("fn main() :=\n    log(missing)\n");
    let loc = err.location.expect("location should be recorded");
    assert_eq!(loc.line, 2);
}

#[test]
fn main_receives_argv_as_a_string_array() {
    let source = "fn main(args) :=\n    log(args)\n";
    let runner = Runner::new(source, "test.doubt", DEFAULT_INDENT).unwrap();
    let mut log = CollectStringLog::new();
    runner
        .run(&["alpha".to_owned(), "beta".to_owned()], &mut log)
        .unwrap();
    assert_eq!(log.into_output(), "['alpha', 'beta']\n");
}

#[test]
fn main_return_value_surfaces_as_an_object() {
    let (object, _) = run("fn main() :=\n    return 7\n").unwrap();
    assert_eq!(object, Object::Int(7));
}

#[test]
fn doubles_and_floats_promote() {
    let output = run_output("fn main() :=\n    log(1 + 2.5)\n    log(2 * 3.5f)\n");
    assert_eq!(output, "3.5\n7.0\n");
}

#[test]
fn if_else_chains_pick_the_right_branch() {
    let output = run_output(
        "fn classify(n) :=\n    if n < 0 :=\n        log(\"neg\")\n    else if n == 0 :=\n        log(\"zero\")\n    else :=\n        log(\"pos\")\nfn main() :=\n    classify(0)\n    classify(5)\n",
    );
    assert_eq!(output, "zero\npos\n");
}

#[test]
fn loop_breaks_on_done_stream_end() {
    let output = run_output(
        "loop fn upto(limit) :=\n    n = 0\n    loop (1) :=\n        n = n + 1\n        if n > limit :=\n            return 0\n        yield n\nfn main() :=\n    for (x <- upto(3)) :=\n        log(x)\n",
    );
    assert_eq!(output, "1\n2\n3\n");
}

#[test]
fn format_substitutes_placeholders() {
    let output = run_output("fn main() :=\n    log(format(\"x = {} y = {}\", 1, \"two\"))\n");
    assert_eq!(output, "x = 1 y = two\n");
}

#[test]
fn format_with_too_few_arguments_errors() {
    let err = run_error("fn main() :=\n    log(format(\"{} {}\", 1))\n");
    assert_eq!(err.kind, ErrorKind::Native);
}

#[test]
fn split_shares_source_and_joins_back() {
    let output = run_output("fn main() :=\n    log(\"a,b,c\".split(\",\"))\n");
    assert_eq!(output, "['a', 'b', 'c']\n");
}
