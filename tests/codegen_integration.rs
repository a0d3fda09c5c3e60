use prove_compiler::diagnostic::Files;
use prove_compiler::driver::{compile, CompileOptions};
use prove_compiler::source::Source;

fn emit(text: &str) -> String {
    let mut files = Files::new();
    let source = Source::from_str("test.prv", text);
    let outcome = compile(&source, &mut files, &CompileOptions::default(), true);
    assert!(
        outcome.success(),
        "compilation failed: {:?}",
        outcome.diagnostics
    );
    outcome.c_unit.expect("error-free modules emit C").source
}

#[test]
fn test_hello_world_emission() {
    let c = emit("main()!\nfrom\n    println(\"Hello from Prove!\")\n");
    assert!(c.contains("#include \"prove_runtime.h\""));
    assert!(c.contains("int main(int argc, char **argv) {"));
    assert!(c.contains("prove_runtime_init();"));
    assert!(c.contains("prove_io_init_args(argc, argv);"));
    assert!(c.contains("prove_println(prove_string_from_cstr(\"Hello from Prove!\"));"));
    assert!(c.contains("prove_runtime_cleanup();"));
    assert!(c.contains("return 0;"));
}

#[test]
fn test_verb_dispatch_mangles_distinct_symbols() {
    let c = emit(
        "\
validates email(a String)
from
    contains(a, \"@\")

transforms email(raw String) String
from
    lower(trim(raw))

main()!
from
    ok as Boolean = email(\"a@b.c\")
    name as String = email(\"  A@B.C \")
    println(name)
",
    );
    assert!(c.contains("bool prove_validates_email_String(Prove_String* a)"));
    assert!(c.contains("Prove_String* prove_transforms_email_String(Prove_String* raw)"));
    assert!(c.contains("bool ok = prove_validates_email_String("));
    assert!(c.contains("Prove_String* name = prove_transforms_email_String("));
}

#[test]
fn test_fail_propagation_lowering() {
    let c = emit(
        "\
type Config is
    host String

transforms decode(raw String) Config
from
    Config(raw)

inputs load(path String) Config!
from
    raw as String = read_file(path)!
    decode(raw)
",
    );
    assert!(c.contains("Prove_Result prove_inputs_load_String(Prove_String* path)"));
    assert!(c.contains("Prove_Result _tmp1 = prove_file_read(path);"));
    assert!(c.contains("if (prove_result_is_err(_tmp1)) return _tmp1;"));
    assert!(c.contains("prove_result_unwrap_ptr(_tmp1)"));
    // The success value wraps back into a Result on return.
    assert!(c.contains("prove_result_ok_ptr("));
}

#[test]
fn test_algebraic_type_lowering() {
    let c = emit(
        "\
type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)

matches area(s Shape) Decimal
from
    Circle(r) => 3.14 * r * r
    Rect(w, h) => w * h

main()!
from
    x as Decimal = area(Circle(2.0))
    println(to_string(x))
",
    );
    // Tagged union with constructor helpers.
    assert!(c.contains("typedef struct Type_Shape Type_Shape;"));
    assert!(c.contains("TYPE_SHAPE_TAG_CIRCLE = 0,"));
    assert!(c.contains("TYPE_SHAPE_TAG_RECT = 1,"));
    assert!(c.contains("uint8_t tag;"));
    assert!(c.contains("} payload;"));
    assert!(c.contains("static inline Type_Shape Type_Shape_Circle(double r)"));
    assert!(c.contains("static inline Type_Shape Type_Shape_Rect(double w, double h)"));
    // The implicit match lowers to a switch over the tag with
    // destructuring assignments.
    assert!(c.contains("switch (_tmp1.tag) {"));
    assert!(c.contains("case TYPE_SHAPE_TAG_CIRCLE: {"));
    assert!(c.contains("double r = _tmp1.payload.Circle.r;"));
    assert!(c.contains("case TYPE_SHAPE_TAG_RECT: {"));
}

#[test]
fn test_wildcard_arm_is_default() {
    let c = emit(
        "\
type Status is Active | Paused | Stopped

matches label(s Status) String
from
    Active => \"active\"
    _ => \"inactive\"
",
    );
    assert!(c.contains("case TYPE_STATUS_TAG_ACTIVE: {"));
    assert!(c.contains("default: {"));
}

#[test]
fn test_refinement_runtime_check_insertion() {
    let c = emit(
        "\
type Port is Integer where 1..65535

inputs configure(n Integer) Port!
from
    port as Port = n
    port
",
    );
    assert!(c.contains("int64_t port = n;"));
    assert!(c.contains("if (!(port >= 1L && port <= 65535L)) prove_panic(\"value out of range for Port\");"));
}

#[test]
fn test_lambda_hoisting() {
    let c = emit(
        "\
transforms doubled(xs List<Integer>) List<Integer>
from
    map(xs, |x| x * 2)
",
    );
    assert!(c.contains("static void *_lambda_"));
    assert!(c.contains("int64_t x = *(int64_t*)_arg;"));
    assert!(c.contains("prove_list_map(xs, _lambda_"));
    assert!(c.contains("#include \"prove_hof.h\""));
}

#[test]
fn test_pipe_desugars_to_call() {
    let c = emit(
        "\
transforms normalize(raw String) String
from
    raw |> trim |> lower
",
    );
    assert!(c.contains("prove_text_to_lower(prove_text_trim(raw))"));
}

#[test]
fn test_foreign_block_externs_and_libs() {
    let mut files = Files::new();
    let source = Source::from_str(
        "test.prv",
        "\
foreign libm
    sqrt(x Decimal) Decimal

transforms root(x Decimal) Decimal
from
    sqrt(x)
",
    );
    let outcome = compile(&source, &mut files, &CompileOptions::default(), true);
    assert!(outcome.success(), "{:?}", outcome.diagnostics);
    let unit = outcome.c_unit.expect("emits");
    assert!(unit.source.contains("#include <math.h>"));
    assert!(unit.source.contains("extern double sqrt(double x);"));
    assert!(unit.source.contains("sqrt(x)"));
    assert_eq!(unit.link_libs, vec!["libm".to_string()]);
}

#[test]
fn test_monomorphized_generics_emit_specializations() {
    let c = emit(
        "\
transforms first(xs List<T>) T
from
    xs[0]

main()!
from
    n as Integer = first([1, 2, 3])
    s as String = first([\"a\", \"b\"])
    println(s)
    println(to_string(n))
",
    );
    assert!(c.contains("prove_transforms_first_List_T___Integer"));
    assert!(c.contains("prove_transforms_first_List_T___String"));
}

#[test]
fn test_retain_release_pairing() {
    let c = emit(
        "\
transforms shout(a String) String
from
    b as String = upper(a)
    b + \"!\"
",
    );
    assert!(c.contains("prove_retain(b);"));
    assert!(c.contains("prove_release(b);"));
}

#[test]
fn test_string_interpolation_emission() {
    let c = emit(
        "\
outputs report(count Integer)!
from
    println(f\"processed {count} items\")
",
    );
    assert!(c.contains("prove_string_concat("));
    assert!(c.contains("prove_string_from_int(count)"));
}

#[test]
fn test_emission_idempotent() {
    let text = "\
type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)

matches area(s Shape) Decimal
from
    Circle(r) => 3.14 * r * r
    Rect(w, h) => w * h

main()!
from
    x as Decimal = area(Circle(2.0))
    println(to_string(x))
";
    assert_eq!(emit(text), emit(text));
}

#[test]
fn test_pure_function_has_no_fail_lowering() {
    let c = emit(
        "\
transforms add(a Integer, b Integer) Integer
from
    a + b
",
    );
    assert!(c.contains("int64_t prove_transforms_add_Integer_Integer(int64_t a, int64_t b)"));
    assert!(!c.contains("prove_result_is_err"));
}
