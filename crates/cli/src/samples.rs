//! Bundled sample stacks.

use serde_json::Value;
use stepstack_engine::{BranchOption, Predicate, StackDefinition, StackModule, StepFn, StepOutcome, StepSignature, When};

fn forward() -> StepFn {
    StepFn::new(StepSignature::from_params(&["acc", "next"]), |mut args| {
        args.take_next()?.proceed();
        Ok(StepOutcome::NoValue)
    })
}

fn returning(value: &'static str) -> StepFn {
    StepFn::new(StepSignature::new(), move |_| Ok(StepOutcome::value(value)))
}

fn pair(name: &str, result: &'static str) -> StackDefinition {
    StackDefinition::named(name).step("one", forward()).step("two", returning(result))
}

fn four() -> StackModule {
    StackModule::Many(vec![pair("fourA", "four a"), pair("fourB", "four b")])
}

fn five() -> StackModule {
    StackModule::Many(vec![pair("fiveA", "five a"), pair("fiveB", "five b")])
}

fn six() -> StackModule {
    let positional = |name: &str, result: &'static str| {
        StackDefinition::named(name)
            .entry(forward().with_name("one"))
            .entry(returning(result).with_name("two"))
    };
    StackModule::Many(vec![positional("sixA", "six a"), positional("sixB", "six b")])
}

fn nine() -> StackModule {
    // Not terminal: skipped when x + z is not above 50.
    let uno = vec![BranchOption::new(
        Predicate::ready(StepSignature::from_params(&["acc", "x", "z"]), |args| {
            let x = args.arguments.get("x").and_then(Value::as_f64);
            let z = args.arguments.get("z").and_then(Value::as_f64);
            Ok(matches!((x, z), (Some(x), Some(z)) if x + z > 50.0))
        }),
        StepFn::new(StepSignature::from_params(&["acc", "x", "next"]), |args| {
            Ok(args.arguments.get("x").cloned().into())
        }),
    )];

    // Terminal with no fallback, so an unmatched accumulator rejects. The
    // second option has no usable condition and is discarded.
    let dose = vec![
        BranchOption::new(
            When::Literal(serde_json::json!({ "y": "nine" })),
            StepFn::new(StepSignature::from_params(&["acc", "y"]), |args| {
                Ok(args.arguments.get("y").cloned().into())
            }),
        ),
        BranchOption::new(When::Literal(Value::Null), StepFn::new(StepSignature::new(), |_| Ok(StepOutcome::NoValue))),
    ];

    StackModule::single("nine", StackDefinition::new().step("uno", uno).step("dose", dose))
}

fn custom() -> StackModule {
    StackModule::single(
        "custom",
        StackDefinition::new().entry("sixA.one").entry("fourA.two").entry("fiveB.three"),
    )
}

/// Every sample module, in load order.
pub fn modules() -> Vec<StackModule> {
    vec![four(), five(), six(), nine(), custom()]
}
