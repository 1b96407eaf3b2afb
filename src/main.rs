use std::sync::Arc;

use portflow::runtime::EventEmitter;
use portflow::{
    build_graph, EngineConfig, Executor, NodeRegistry, ProcessContext, RunContext, WorkflowSchema,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== portflow engine demo ===\n");

    let workflow = serde_json::json!({
        "nodes": {
            "names": {
                "type": "TextToList",
                "inputs": {"text": " ada , grace , edsger ", "format": "delimited", "delimiter": ","}
            },
            "fanout": {
                "type": "ForEach",
                "inputs": {
                    "sub_workflow": {
                        "nodes": {
                            "item": {"type": "ForEachItem"},
                            "strip": {"type": "TextStrip"},
                            "greet": {"type": "TextConcat", "inputs": {"text1": "hello,", "separator": " "}}
                        },
                        "connections": [
                            {"from_node": "item", "from_port": "item", "to_node": "strip", "to_port": "text"},
                            {"from_node": "strip", "from_port": "text", "to_node": "greet", "to_port": "text2"}
                        ]
                    },
                    "result_node_id": "greet",
                    "result_port_name": "result",
                    "parallel": true,
                    "max_workers": 2
                }
            }
        },
        "connections": [
            {"from_node": "names", "from_port": "list", "to_node": "fanout", "to_port": "items"}
        ]
    });

    let schema: WorkflowSchema = serde_json::from_value(workflow).expect("workflow parses");
    let registry = Arc::new(NodeRegistry::new());
    let graph = build_graph(&schema, &registry).expect("workflow validates");
    println!(
        "[OK] graph built ({} nodes, {} connections)",
        graph.node_count(),
        graph.connections().len()
    );

    let run = Arc::new(RunContext::new());
    let ctx = ProcessContext::new(
        run.clone(),
        registry,
        EventEmitter::disabled(),
        EngineConfig::default(),
    );

    match Executor::new(graph, ctx).run().await {
        Ok(results) => {
            println!("[OK] run {} completed", run.run_id());
            let greetings = &results["fanout"]["results"];
            println!("greetings: {}", greetings);
        }
        Err(e) => {
            eprintln!("[ERR] run failed: {}", e);
            std::process::exit(1);
        }
    }
}
