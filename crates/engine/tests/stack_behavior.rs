use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::anyhow;
use serde_json::{Value, json};
use stepstack_engine::{
    Accumulator, BranchOption, Check, Context, FaultOrigin, InMemoryProvider, NullProvider, Predicate, Provided, Stack, StackDefinition,
    StackError, StackRegistry, StepFn, StepOutcome, StepSignature, ValueProvider, When,
};

fn create(registry: &StackRegistry, name: &str) -> Stack {
    Stack::create(registry, Arc::new(NullProvider), StackDefinition::named(name)).expect("create empty stack")
}

fn deferred_nothing(name: &str) -> StepFn {
    StepFn::named(name, StepSignature::from_params(&["acc", "next"]), |_| {
        Ok(StepOutcome::deferred(async { Ok(None) }))
    })
}

fn callback_forward(name: &str) -> StepFn {
    StepFn::named(name, StepSignature::from_params(&["acc", "next"]), |mut args| {
        let next = args.take_next()?;
        tokio::spawn(async move { next.proceed() });
        Ok(StepOutcome::NoValue)
    })
}

fn callback_finish(name: &str, value: Value) -> StepFn {
    StepFn::named(name, StepSignature::from_params(&["acc", "next"]), move |mut args| {
        let next = args.take_next()?;
        let value = value.clone();
        tokio::spawn(async move { next.finish(value) });
        Ok(StepOutcome::NoValue)
    })
}

fn returning(name: &str, value: Value) -> StepFn {
    StepFn::named(name, StepSignature::new(), move |_| Ok(StepOutcome::Value(value.clone())))
}

/// Builds `one, two, three, four` through insertion, optionally short-circuited after `one`.
fn four_steps(stack: &Stack, one: StepFn, two: StepFn, three: StepFn, four: StepFn, short: Option<StepFn>) {
    stack.append(one, None).expect("append one");
    let first = stack.steps()[0].clone();
    stack.append(four, None).expect("append four");
    let last = stack.steps()[1].clone();
    stack.insert_after(&first, two, None).expect("insert two");
    stack.insert_before(&last, three, None).expect("insert three");
    if let Some(short) = short {
        stack.insert_after(&first, short, None).expect("insert short circuit");
    }
}

#[tokio::test]
async fn deferred_pipeline_resolves_to_final_value() {
    let registry = StackRegistry::new();
    let stack = create(&registry, "allDeferred");
    four_steps(
        &stack,
        deferred_nothing("one"),
        deferred_nothing("two"),
        deferred_nothing("three"),
        returning("four", json!(4)),
        None,
    );

    assert_eq!(stack.steps(), ["one", "two", "three", "four"]);
    assert_eq!(stack.execute(None, None).await.expect("execute"), Some(json!(4)));
}

#[tokio::test]
async fn callback_pipeline_resolves_to_final_value() {
    let registry = StackRegistry::new();
    let stack = create(&registry, "allCallbacks");
    four_steps(
        &stack,
        callback_forward("one"),
        callback_forward("two"),
        callback_forward("three"),
        callback_finish("four", json!(4)),
        None,
    );

    assert_eq!(stack.execute(None, None).await.expect("execute"), Some(json!(4)));
}

#[tokio::test]
async fn value_from_inner_step_short_circuits() {
    let registry = StackRegistry::new();
    let invoked = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invoked);
    let counted = StepFn::named("four", StepSignature::new(), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(StepOutcome::value(4))
    });

    let stack = create(&registry, "shortCircuited");
    four_steps(
        &stack,
        deferred_nothing("one"),
        deferred_nothing("two"),
        deferred_nothing("three"),
        counted,
        Some(StepFn::named("result", StepSignature::new(), |_| {
            Ok(StepOutcome::deferred(async { Ok(Some(json!(3))) }))
        })),
    );

    assert_eq!(stack.steps(), ["one", "result", "two", "three", "four"]);
    assert_eq!(stack.execute(None, None).await.expect("execute"), Some(json!(3)));
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn faults_reject_with_the_same_message_whatever_the_channel() {
    let failing = [
        (StepFn::named("thrown", StepSignature::new(), |_| Err(anyhow!("no"))), FaultOrigin::Thrown),
        (
            StepFn::named("rejected", StepSignature::new(), |_| {
                Ok(StepOutcome::deferred(async { Err(anyhow!("no")) }))
            }),
            FaultOrigin::Deferred,
        ),
        (
            StepFn::named("returned", StepSignature::new(), |_| Ok(StepOutcome::fault(anyhow!("no")))),
            FaultOrigin::Returned,
        ),
        (
            StepFn::named("continued", StepSignature::from_params(&["acc", "next"]), |mut args| {
                let next = args.take_next()?;
                tokio::spawn(async move { next.fail(anyhow!("no")) });
                Ok(StepOutcome::NoValue)
            }),
            FaultOrigin::Continuation,
        ),
    ];

    for (step, origin) in failing {
        let registry = StackRegistry::new();
        let stack = create(&registry, "failing");
        stack.append(deferred_nothing("one"), None).expect("append one");
        stack.append(callback_forward("two"), None).expect("append two");
        stack.append(step, None).expect("append failing step");

        let error = stack.execute(None, None).await.expect_err("stack should reject");
        assert_eq!(error.to_string(), "no");
        assert_eq!(error.origin(), Some(origin));
    }
}

#[tokio::test]
async fn clones_diverge_independently() {
    let registry = StackRegistry::new();
    let definition = StackDefinition::named("one")
        .step("a", StepFn::new(StepSignature::new(), |_| Ok(StepOutcome::deferred(async { Ok(None) }))))
        .step("b", callback_forward("b"))
        .step("c", returning("c", json!("one-a")));
    let one = Stack::create(&registry, Arc::new(NullProvider), definition).expect("create one");

    let three = one.clone_as("three").expect("clone three");
    let five = one.clone_as("five").expect("clone five");
    three
        .insert_before("c", StepFn::named("d", StepSignature::new(), |_| {
            Ok(StepOutcome::deferred(async { Ok(Some(json!("one-b"))) }))
        }), None)
        .expect("insert d");
    five.prepend(returning("f", json!(1)), None).expect("prepend f");

    assert_eq!(one.execute(None, None).await.expect("one"), Some(json!("one-a")));
    assert_eq!(three.execute(None, None).await.expect("three"), Some(json!("one-b")));
    assert_eq!(five.execute(None, None).await.expect("five"), Some(json!(1)));
    assert_eq!(one.steps(), ["a", "b", "c"]);

    three.prepend(StepFn::named("i", StepSignature::new(), |_| Err(anyhow!("thrown error"))), None)
        .expect("prepend i");
    let error = three.execute(None, None).await.expect_err("three should reject");
    assert_eq!(error.to_string(), "thrown error");
    assert_eq!(one.execute(None, None).await.expect("one unaffected"), Some(json!("one-a")));
    assert_eq!(registry.names(), ["one", "three", "five"]);
}

#[tokio::test]
async fn custom_arguments_come_from_context_then_accumulator_then_provider() {
    let registry = StackRegistry::new();
    let provider = InMemoryProvider::new();
    let definition = StackDefinition::named("custom")
        .entry(StepFn::named("a", StepSignature::from_params(&["acc", "x", "next"]), |mut args| {
            let next = args.take_next()?;
            match args.arguments.get("x") {
                Some(x) => Ok(StepOutcome::Value(x.clone())),
                None => {
                    next.proceed();
                    Ok(StepOutcome::NoValue)
                }
            }
        }))
        .entry(deferred_nothing("b"))
        .entry(callback_finish("c", json!("c")));
    let stack = Stack::create(&registry, Arc::new(provider.clone()), definition).expect("create custom");

    assert_eq!(stack.execute(None, None).await.expect("default"), Some(json!("c")));

    let context = Context::try_from(json!({"x": 5})).expect("context");
    assert_eq!(stack.execute(Some(context), None).await.expect("context"), Some(json!(5)));

    let accumulator = Accumulator::try_from(json!({"x": 6})).expect("accumulator");
    assert_eq!(stack.execute(None, Some(accumulator)).await.expect("accumulator"), Some(json!(6)));

    provider.register("x", Provided::deferred(|| async { Ok(json!(7)) }));
    assert_eq!(stack.execute(None, None).await.expect("provider"), Some(json!(7)));
}

#[tokio::test]
async fn branch_dispatch_follows_declaration_order() {
    let registry = StackRegistry::new();
    let slow = Predicate::new(StepSignature::new(), |_| {
        Ok(Check::Deferred(Box::pin(async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(true)
        })))
    });
    let fast = Predicate::ready(StepSignature::new(), |_| Ok(true));
    let definition = StackDefinition::named("ordered").step(
        "route",
        vec![
            BranchOption::new(slow, returning("p1", json!("p1"))),
            BranchOption::new(fast, returning("p2", json!("p2"))),
        ],
    );
    let stack = Stack::create(&registry, Arc::new(NullProvider), definition).expect("create ordered");

    assert_eq!(stack.execute(None, None).await.expect("execute"), Some(json!("p1")));
}

#[tokio::test]
async fn branch_without_match_falls_through_unless_terminal() {
    let registry = StackRegistry::new();
    let provider: Arc<dyn ValueProvider> = Arc::new(NullProvider);
    let uno = vec![BranchOption::new(
        Predicate::ready(StepSignature::from_params(&["acc", "x", "z"]), |args| {
            let x = args.arguments.get("x").and_then(Value::as_i64);
            let z = args.arguments.get("z").and_then(Value::as_i64);
            Ok(matches!((x, z), (Some(x), Some(z)) if x + z > 50))
        }),
        StepFn::new(StepSignature::from_params(&["acc", "x", "next"]), |args| {
            Ok(args.arguments.get("x").cloned().into())
        }),
    )];
    let dose = vec![
        BranchOption::new(
            json!({"y": "nine"}),
            StepFn::new(StepSignature::from_params(&["acc", "y"]), |args| {
                Ok(args.arguments.get("y").cloned().into())
            }),
        ),
        BranchOption::pass(When::Literal(json!(42))),
    ];
    let nine = Stack::create(
        &registry,
        provider,
        StackDefinition::named("nine").step("uno", uno).step("dose", dose),
    )
    .expect("create nine");

    assert_eq!(nine.warnings().len(), 1, "malformed condition should be reported");

    let first = Accumulator::try_from(json!({"x": 9, "z": 50})).expect("accumulator");
    assert_eq!(nine.execute(None, Some(first)).await.expect("first"), Some(json!(9)));

    let second = Accumulator::try_from(json!({"y": "nine"})).expect("accumulator");
    assert_eq!(nine.execute(None, Some(second)).await.expect("second"), Some(json!("nine")));

    let error = nine.execute(None, None).await.expect_err("no condition met");
    assert_eq!(error.to_string(), "The call stack failed to meet any of the supported conditions");
    assert_eq!(error.origin(), Some(FaultOrigin::Returned));
}

#[tokio::test]
async fn composed_stacks_share_the_referenced_step() {
    let registry = StackRegistry::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let shared = StepFn::new(StepSignature::new(), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(StepOutcome::value("shared"))
    });
    let other = Stack::create(
        &registry,
        Arc::new(NullProvider),
        StackDefinition::named("other").step("first", callback_forward("first")).step("shared", shared),
    )
    .expect("create other");

    let composed = Stack::create(
        &registry,
        Arc::new(NullProvider),
        StackDefinition::named("composed").entry("other.shared").entry("other.unknown"),
    )
    .expect("create composed");

    assert!(Arc::ptr_eq(
        &composed.step("shared").expect("composed step"),
        &other.step("shared").expect("source step")
    ));
    assert_eq!(composed.warnings().len(), 1);

    assert_eq!(other.execute(None, None).await.expect("other"), Some(json!("shared")));
    assert_eq!(composed.execute(None, None).await.expect("composed"), Some(json!("shared")));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invalid_and_missing_steps_are_reported() {
    let registry = StackRegistry::new();
    let stack = create(&registry, "broken");

    let error = stack.append(json!({}), Some("x")).expect_err("plain data is not a step");
    assert!(matches!(error, StackError::InvalidStep { ref name, .. } if name == "x"));
    assert_eq!(error.to_string(), "Cannot add non-function x to stack: {}");

    let error = stack.execute(None, None).await.expect_err("empty stack");
    assert!(matches!(error, StackError::EmptyStack { .. }));

    let mut calls = std::collections::HashMap::new();
    calls.insert("real".to_string(), stack_step(&registry));
    let plan = stepstack_engine::StackPlan::new("broken", vec!["uhoh".into(), "real".into()], calls);
    let error = stepstack_engine::execute_plan(&plan, None, None).await.expect_err("missing step");
    assert_eq!(error.to_string(), "Could not invoke step 'uhoh' as it is not a valid function");
}

fn stack_step(registry: &StackRegistry) -> stepstack_engine::WrappedStep {
    let source = Stack::create(
        registry,
        Arc::new(NullProvider),
        StackDefinition::named("source").step("real", returning("real", json!(1))),
    )
    .expect("create source");
    source.step("real").expect("real step")
}

#[tokio::test]
async fn failing_provider_value_rejects_as_the_step_fault() {
    let registry = StackRegistry::new();
    let provider = InMemoryProvider::new();
    provider.register("x", Provided::deferred(|| async { Err(anyhow!("x")) }));
    let definition = StackDefinition::named("provided").step(
        "needs_x",
        StepFn::new(StepSignature::from_params(&["acc", "x"]), |args| {
            Ok(args.arguments.get("x").cloned().into())
        }),
    );
    let stack = Stack::create(&registry, Arc::new(provider), definition).expect("create provided");

    let error = stack.execute(None, None).await.expect_err("provider failure should reject");
    assert_eq!(error.to_string(), "x");
    assert_eq!(error.origin(), Some(FaultOrigin::Thrown));
    assert_eq!(error.step(), Some("needs_x"));
}

#[tokio::test]
async fn appending_a_wrapped_step_reuses_it_unchanged() {
    let registry = StackRegistry::new();
    let source = Stack::create(
        &registry,
        Arc::new(NullProvider),
        StackDefinition::named("source").step("s", returning("s", json!("from source"))),
    )
    .expect("create source");
    let target = create(&registry, "target");

    let wrapped = source.step("s").expect("source step");
    target.append(wrapped, Some("s")).expect("append wrapped step");

    assert!(Arc::ptr_eq(
        &target.step("s").expect("target step"),
        &source.step("s").expect("source step")
    ));
    assert_eq!(target.execute(None, None).await.expect("target"), Some(json!("from source")));
}
