//! End-to-end parameter removal and reorder scenarios.
//!
//! Each test builds a small project from source text, indexes it, runs the
//! engine, and checks the rewritten module texts plus the outcome report.

use vbatool::error::RefactorError;
use vbatool::fixture::{self, Fixture};
use vbatool::ops::{RefactoringEngine, ReorderParamsRequest, Selection};
use vbatool::output::RefactorOutcome;
use vbatool::signature::PlanRule;

// ============================================================================
// Test Infrastructure
// ============================================================================

fn request(f: &Fixture, module: &str, needle: &str, order: &[usize]) -> ReorderParamsRequest {
    let module = f.module(module);
    ReorderParamsRequest::new(
        Selection::new(module, f.offset_of(module, needle)),
        order.to_vec(),
    )
}

fn reorder(
    f: &Fixture,
    module: &str,
    needle: &str,
    order: &[usize],
) -> Result<RefactorOutcome, RefactorError> {
    RefactoringEngine::new().reorder_parameters(&f.index, &f.text, &request(f, module, needle, order))
}

fn rewritten<'a>(outcome: &'a RefactorOutcome, f: &Fixture, module: &str) -> &'a str {
    outcome
        .module_text(f.module(module))
        .expect("module should be rewritten")
}

// ============================================================================
// Removal and reorder
// ============================================================================

#[test]
fn removing_a_middle_parameter_rewrites_signature_and_calls() {
    let f = fixture::project(&[
        (
            "Mod1",
            "Public Sub Foo(a As Long, b As String, c As Boolean)\nEnd Sub\n",
        ),
        (
            "Mod2",
            "Public Sub Caller()\n    Call Foo(1, \"x\", True)\nEnd Sub\n",
        ),
    ]);

    let outcome = reorder(&f, "Mod1", "Foo(a", &[0, 2]).unwrap();

    assert_eq!(
        rewritten(&outcome, &f, "Mod1"),
        "Public Sub Foo(a As Long, c As Boolean)\nEnd Sub\n"
    );
    assert_eq!(
        rewritten(&outcome, &f, "Mod2"),
        "Public Sub Caller()\n    Call Foo(1, True)\nEnd Sub\n"
    );
    assert!(outcome.skipped.is_empty());
}

#[test]
fn removal_and_reorder_combine_in_one_plan() {
    let f = fixture::project(&[
        (
            "Mod1",
            "Public Sub Move(src As String, dst As String, flag As Boolean)\nEnd Sub\n",
        ),
        (
            "Mod2",
            "Public Sub Caller()\n    Move \"a\", \"b\", True\nEnd Sub\n",
        ),
    ]);

    let outcome = reorder(&f, "Mod1", "Move(src", &[1, 0]).unwrap();

    assert_eq!(
        rewritten(&outcome, &f, "Mod1"),
        "Public Sub Move(dst As String, src As String)\nEnd Sub\n"
    );
    assert_eq!(
        rewritten(&outcome, &f, "Mod2"),
        "Public Sub Caller()\n    Move \"b\", \"a\"\nEnd Sub\n"
    );
}

#[test]
fn rerunning_the_same_plan_is_deterministic() {
    let f = fixture::project(&[
        (
            "Mod1",
            "Public Sub Foo(a As Long, b As String, c As Boolean)\nEnd Sub\n",
        ),
        (
            "Mod2",
            "Public Sub Caller()\n    Call Foo(1, \"x\", True)\nEnd Sub\n",
        ),
    ]);

    let first = reorder(&f, "Mod1", "Foo(a", &[0, 2]).unwrap();
    let second = reorder(&f, "Mod1", "Foo(a", &[0, 2]).unwrap();

    assert_eq!(first.modules, second.modules);
    assert_eq!(first.edits, second.edits);
}

#[test]
fn recursive_calls_follow_the_new_parameter_order() {
    let f = fixture::project(&[
        (
            "Mod1",
            "Public Sub Count(depth As Long, n As Long)\n    Count n - 1, depth + 1\nEnd Sub\n",
        ),
        ("Mod2", "Public Sub Kick()\n    Count 0, 10\nEnd Sub\n"),
    ]);

    let outcome = reorder(&f, "Mod1", "Count(depth", &[1, 0]).unwrap();

    assert_eq!(
        rewritten(&outcome, &f, "Mod1"),
        "Public Sub Count(n As Long, depth As Long)\n    Count depth + 1, n - 1\nEnd Sub\n"
    );
    assert_eq!(
        rewritten(&outcome, &f, "Mod2"),
        "Public Sub Kick()\n    Count 10, 0\nEnd Sub\n"
    );
    assert!(outcome.skipped.is_empty());
}

// ============================================================================
// Signature propagation
// ============================================================================

#[test]
fn property_triad_keeps_accessor_signatures_aligned() {
    let grid = "\
Private data As Long

Public Property Get Cell(ByVal row As Long, ByVal col As Long) As Long
    Cell = data
End Property

Public Property Let Cell(ByVal row As Long, ByVal col As Long, ByVal value As Long)
    data = value
End Property
";
    let board = "\
Public Sub Paint(g As Grid)
    g.Cell(1, 2) = 5
    Debug.Print g.Cell(3, 4)
End Sub
";
    let f = fixture::project(&[("Grid", grid), ("Board", board)]);

    let outcome = reorder(&f, "Grid", "Cell(ByVal row", &[0]).unwrap();

    assert_eq!(
        rewritten(&outcome, &f, "Grid"),
        "\
Private data As Long

Public Property Get Cell(ByVal row As Long) As Long
    Cell = data
End Property

Public Property Let Cell(ByVal row As Long, ByVal value As Long)
    data = value
End Property
"
    );
    assert_eq!(
        rewritten(&outcome, &f, "Board"),
        "\
Public Sub Paint(g As Grid)
    g.Cell(1) = 5
    Debug.Print g.Cell(3)
End Sub
"
    );
}

#[test]
fn event_declaration_propagates_to_handlers_and_raises() {
    let button = "\
Public Event Clicked(id As Long, source As String)

Public Sub Fire()
    RaiseEvent Clicked(1, \"btn\")
End Sub
";
    let form = "\
Private WithEvents btn As Button

Private Sub btn_Clicked(id As Long, source As String)
    Debug.Print id
End Sub
";
    let f = fixture::project(&[("Button", button), ("Form", form)]);

    let outcome = reorder(&f, "Button", "Clicked(id", &[0]).unwrap();

    assert_eq!(
        rewritten(&outcome, &f, "Button"),
        "\
Public Event Clicked(id As Long)

Public Sub Fire()
    RaiseEvent Clicked(1)
End Sub
"
    );
    assert_eq!(
        rewritten(&outcome, &f, "Form"),
        "\
Private WithEvents btn As Button

Private Sub btn_Clicked(id As Long)
    Debug.Print id
End Sub
"
    );
}

#[test]
fn interface_member_propagates_to_implementers() {
    let f = fixture::project(&[
        ("IShape", "Public Sub Draw(x As Long, y As Long)\nEnd Sub\n"),
        (
            "Circle",
            "Implements IShape\n\nPrivate Sub IShape_Draw(x As Long, y As Long)\n    Debug.Print x\nEnd Sub\n",
        ),
        (
            "Painter",
            "Public Sub Render(s As IShape)\n    s.Draw 10, 20\nEnd Sub\n",
        ),
    ]);

    let outcome = reorder(&f, "IShape", "Draw(x", &[0]).unwrap();

    assert_eq!(
        rewritten(&outcome, &f, "IShape"),
        "Public Sub Draw(x As Long)\nEnd Sub\n"
    );
    assert_eq!(
        rewritten(&outcome, &f, "Circle"),
        "Implements IShape\n\nPrivate Sub IShape_Draw(x As Long)\n    Debug.Print x\nEnd Sub\n"
    );
    assert_eq!(
        rewritten(&outcome, &f, "Painter"),
        "Public Sub Render(s As IShape)\n    s.Draw 10\nEnd Sub\n"
    );
}

#[test]
fn selecting_the_implementer_redirects_to_the_interface_member() {
    let modules: &[(&str, &str)] = &[
        ("IShape", "Public Sub Draw(x As Long, y As Long)\nEnd Sub\n"),
        (
            "Circle",
            "Implements IShape\n\nPrivate Sub IShape_Draw(x As Long, y As Long)\nEnd Sub\n",
        ),
        (
            "Painter",
            "Public Sub Render(s As IShape)\n    s.Draw 10, 20\nEnd Sub\n",
        ),
    ];

    let f = fixture::project(modules);
    let via_interface = reorder(&f, "IShape", "Draw(x", &[0]).unwrap();
    let via_implementer = reorder(&f, "Circle", "IShape_Draw(x", &[0]).unwrap();

    assert_eq!(via_interface.modules, via_implementer.modules);
}

// ============================================================================
// Plan validation
// ============================================================================

#[test]
fn optional_parameter_cannot_precede_required() {
    let source = "Public Sub Conf(a As Long, b As String, Optional c As Long = 1)\nEnd Sub\n";
    let f = fixture::project(&[("Mod1", source)]);

    let err = reorder(&f, "Mod1", "Conf(a", &[0, 2, 1]).unwrap_err();
    assert_eq!(
        err,
        RefactorError::InvalidSignaturePlan {
            rule: PlanRule::OptionalBeforeRequired {
                parameter: "b".to_string()
            }
        }
    );

    // Planning fails before anything is staged; a preview errors the same
    // way and the input text is untouched.
    let preview = RefactoringEngine::new().preview_reorder_parameters(
        &f.index,
        &f.text,
        &request(&f, "Mod1", "Conf(a", &[0, 2, 1]),
    );
    assert_eq!(preview.unwrap_err(), err);
    assert_eq!(f.text.get(f.module("Mod1")), Some(source));
}

#[test]
fn param_array_must_stay_last() {
    let f = fixture::project(&[(
        "Mod1",
        "Public Sub Log(tag As String, ParamArray items() As Variant)\nEnd Sub\n",
    )]);

    let err = reorder(&f, "Mod1", "Log(tag", &[1, 0]).unwrap_err();
    assert_eq!(
        err,
        RefactorError::InvalidSignaturePlan {
            rule: PlanRule::ParamArrayNotLast {
                parameter: "items".to_string()
            }
        }
    );
}

// ============================================================================
// Skip reporting
// ============================================================================

#[test]
fn named_argument_calls_are_skipped_and_reported() {
    let f = fixture::project(&[
        (
            "Mod1",
            "Public Sub Notify(id As Long, msg As String)\nEnd Sub\n",
        ),
        (
            "Mod2",
            "Public Sub Caller()\n    Notify id:=1, msg:=\"hi\"\nEnd Sub\n",
        ),
    ]);

    let outcome = reorder(&f, "Mod1", "Notify(id", &[0]).unwrap();

    assert_eq!(
        rewritten(&outcome, &f, "Mod1"),
        "Public Sub Notify(id As Long)\nEnd Sub\n"
    );
    // The named-argument call site is left alone and reported.
    assert!(outcome.module_text(f.module("Mod2")).is_none());
    assert_eq!(outcome.skipped.len(), 1);
    let skip = &outcome.skipped[0];
    assert_eq!(skip.module, f.module("Mod2"));
    assert_eq!(skip.line, 2);
    assert!(skip.reason.contains("named arguments"));
}
