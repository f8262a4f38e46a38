//! Built-in `echo` analysis, served in-process.
//!
//! Exercises the whole client protocol without a worker: argument binding,
//! action brackets, request args and emits.

use sb_analysis::{SignalTable, Signature};
use sb_domain::config::BUILTIN_ECHO_NAMESPACE;
use serde_json::{json, Value};

use crate::namespaces::Namespace;

pub fn echo_namespace() -> Namespace {
    Namespace::local(
        BUILTIN_ECHO_NAMESPACE,
        "Built-in echo analysis",
        echo_table(),
    )
}

pub fn echo_table() -> SignalTable {
    let mut table = SignalTable::new();
    table
        // test_fn(first, second=100) → test_fn [first, second]
        .on(
            "test_fn",
            Signature::new(["first"]).optional(["second"]),
            |session, args| async move {
                let first = args.get("first").cloned().unwrap_or(Value::Null);
                let second = args.get("second").cloned().unwrap_or(json!(100));
                session.emit("test_fn", &json!([first, second])).await?;
                Ok(())
            },
        )
        .on(
            "test_action",
            Signature::none().with_rest().with_extra(),
            |session, _| async move {
                session.emit("test_action_ack", &json!({})).await?;
                Ok(())
            },
        )
        .on("run", Signature::new(["my_param"]), |session, args| async move {
            let param: String = args.value("my_param")?;
            session
                .emit("result", &json!({ "result": format!("done:{param}") }))
                .await?;
            Ok(())
        })
        .on_connect(|session| async move {
            session
                .emit("echo_request_args", session.request_args())
                .await?;
            Ok(())
        });
    table
}
