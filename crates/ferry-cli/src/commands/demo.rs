//! `ferry demo`: drive the library types through a host and print what
//! foreign code would observe.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use ferry_engine::runtime::PromiseStatus;
use ferry_engine::{Context, JsResult, ObjectRef, Value};
use ferry_runtime::{Host, RuntimeOptions};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Demonstration scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Calls, properties, statics and error reporting
    Calculator,
    /// Matrix factories and background resize/load
    Imaging,
    /// Events fired from a worker thread
    Events,
    /// Every scenario in turn
    All,
}

pub fn execute(options: &RuntimeOptions, scenario: Scenario) -> anyhow::Result<()> {
    let host = Host::new(options)?;
    for line in run(&host, scenario)? {
        println!("{}", line);
    }
    for diagnostic in host.take_diagnostics() {
        eprintln!("diagnostic: {}", diagnostic);
    }
    let report = host.shutdown();
    log::info!(
        "worker pool stopped ({} joined, {} detached)",
        report.joined,
        report.detached
    );
    Ok(())
}

/// Run `scenario`, returning the transcript
pub fn run(host: &Host, scenario: Scenario) -> anyhow::Result<Vec<String>> {
    let mut out = Vec::new();
    match scenario {
        Scenario::Calculator => calculator(host, &mut out)?,
        Scenario::Imaging => imaging(host, &mut out)?,
        Scenario::Events => events(host, &mut out)?,
        Scenario::All => {
            calculator(host, &mut out)?;
            imaging(host, &mut out)?;
            events(host, &mut out)?;
        }
    }
    Ok(out)
}

/// Foreign throws become errors carrying the thrown value's description
fn check<T>(cx: &Context, result: JsResult<T>) -> anyhow::Result<T> {
    result.map_err(|throw| anyhow::anyhow!("{}", cx.describe(throw.value())))
}

/// Describe the outcome of `result` either way
fn outcome<T>(cx: &Context, result: JsResult<T>, show: impl FnOnce(T) -> String) -> String {
    match result {
        Ok(value) => show(value),
        Err(throw) => format!("threw {}", cx.describe(throw.value())),
    }
}

fn object(cx: &Context, value: Value) -> anyhow::Result<ObjectRef> {
    match value {
        Value::Object(object) => Ok(object),
        other => anyhow::bail!("expected an object, got {}", cx.describe(&other)),
    }
}

fn await_promise(host: &Host, promise: &Value) -> anyhow::Result<Result<Value, Value>> {
    if !host.run_until_idle(SETTLE_TIMEOUT) {
        anyhow::bail!("promise did not settle within {:?}", SETTLE_TIMEOUT);
    }
    match host.context().promise_state(promise) {
        Some(PromiseStatus::Fulfilled(value)) => Ok(Ok(value)),
        Some(PromiseStatus::Rejected(reason)) => Ok(Err(reason)),
        Some(PromiseStatus::Pending) => anyhow::bail!("promise still pending"),
        None => anyhow::bail!("not a promise"),
    }
}

// ============================================================================
// Scenarios
// ============================================================================

fn calculator(host: &Host, out: &mut Vec<String>) -> anyhow::Result<()> {
    let cx = host.context();
    let n = Value::Number;
    let calc = check(cx, host.construct("Calculator", &[]))?;
    let show = |v: Value| cx.describe(&v);

    out.push("# Calculator".to_string());
    let r = cx.call_method(&calc, "add", &[n(2.0), n(3.0)]);
    out.push(format!("add(2, 3) = {}", outcome(cx, r, show)));
    let r = cx.call_method(&calc, "add", &[n(2.0)]);
    out.push(format!("add(2) = {}", outcome(cx, r, show)));
    let r = cx.call_method(&calc, "divide", &[n(1.0), n(4.0)]);
    out.push(format!("divide(1, 4) = {}", outcome(cx, r, show)));
    let r = cx.call_method(&calc, "divide", &[n(1.0), n(0.0)]);
    out.push(format!("divide(1, 0) = {}", outcome(cx, r, show)));
    let r = cx.call_method(&calc, "concat", &[Value::string("fer"), Value::string("ry")]);
    out.push(format!("concat(\"fer\", \"ry\") = {}", outcome(cx, r, show)));

    let r = cx.set(&calc, "calls", n(0.0));
    out.push(format!("calls = 0 -> {}", outcome(cx, r, |_| "ok".to_string())));
    let r = cx.get(&calc, "calls");
    out.push(format!("calls = {}", outcome(cx, r, show)));

    let class = object(cx, check(cx, host.class("Calculator"))?)?;
    let r = cx.call_method(&class, "square", &[n(12.0)]);
    out.push(format!("Calculator.square(12) = {}", outcome(cx, r, show)));
    let r = cx.get(&class, "PI");
    out.push(format!("Calculator.PI = {}", outcome(cx, r, show)));
    Ok(())
}

fn imaging(host: &Host, out: &mut Vec<String>) -> anyhow::Result<()> {
    let cx = host.context();
    let n = Value::Number;
    let imaging = check(cx, host.construct("Imaging", &[]))?;
    let shape = |m: &ObjectRef| -> anyhow::Result<String> {
        let rows = check(cx, cx.call_method(m, "rows", &[]))?;
        let cols = check(cx, cx.call_method(m, "cols", &[]))?;
        let kind = check(cx, cx.call_method(m, "type", &[]))?;
        Ok(format!(
            "{}x{}x{}",
            cx.describe(&rows),
            cx.describe(&cols),
            cx.describe(&kind)
        ))
    };

    out.push("# Imaging".to_string());
    let ones = check(cx, cx.call_method(&imaging, "ones", &[n(4.0), n(6.0), n(3.0)]))?;
    let ones = object(cx, ones)?;
    let bytes = check(cx, cx.get(&ones, "data"))?
        .as_object()
        .and_then(|data| data.array_buffer().map(|b| b.len()))
        .unwrap_or(0);
    out.push(format!("ones(4, 6, RGB) = {} matrix, {} bytes", shape(&ones)?, bytes));

    let promise = check(
        cx,
        cx.call_method(
            &imaging,
            "resize",
            &[Value::Object(ones), n(3.0), n(2.0), n(1.0)],
        ),
    )?;
    let started = Instant::now();
    match await_promise(host, &promise)? {
        Ok(resized) => out.push(format!(
            "resize(ones, 3, 2, LINEAR) resolved: {} matrix after {:?}",
            shape(&object(cx, resized)?)?,
            started.elapsed()
        )),
        Err(reason) => out.push(format!("resize rejected: {}", cx.describe(&reason))),
    }

    let promise = check(
        cx,
        cx.call_method(&imaging, "load", &[Value::string("missing.pgm")]),
    )?;
    match await_promise(host, &promise)? {
        Ok(image) => out.push(format!("load resolved: {}", shape(&object(cx, image)?)?)),
        Err(reason) => out.push(format!("load(\"missing.pgm\") rejected: {}", cx.describe(&reason))),
    }
    Ok(())
}

fn events(host: &Host, out: &mut Vec<String>) -> anyhow::Result<()> {
    let cx = host.context();
    let ticker = check(cx, host.construct("Ticker", &[]))?;
    out.push("# Events".to_string());

    let channels = check(cx, cx.call_method(&ticker, "on", &[]))?;
    out.push(format!("channels: {}", cx.describe(&channels)));

    let log = Rc::new(RefCell::new(Vec::new()));
    let changed = {
        let log = log.clone();
        cx.create_closure("onChanged", move |cx, info| {
            log.borrow_mut()
                .push(format!("changed({})", cx.describe(&info.arg(0))));
            Ok(Value::Undefined)
        })
    };
    let finished = {
        let log = log.clone();
        cx.create_closure("onFinished", move |_, _| {
            log.borrow_mut().push("finished()".to_string());
            Ok(Value::Undefined)
        })
    };
    check(
        cx,
        cx.call_method(&ticker, "on", &[Value::string("changed(int)"), Value::Object(changed)]),
    )?;
    check(
        cx,
        cx.call_method(&ticker, "on", &[Value::string("finished()"), Value::Object(finished)]),
    )?;

    check(cx, cx.call_method(&ticker, "start", &[Value::Number(3.0)]))?;
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while !log.borrow().iter().any(|line| line == "finished()") {
        if Instant::now() >= deadline {
            anyhow::bail!("ticker did not finish within {:?}", SETTLE_TIMEOUT);
        }
        host.run_until_idle(Duration::from_millis(50));
    }
    for line in log.borrow().iter() {
        out.push(format!("event {}", line));
    }
    Ok(())
}
