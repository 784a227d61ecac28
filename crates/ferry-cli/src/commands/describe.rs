//! `ferry describe`: print reflection descriptors as text or JSON.

use ferry_runtime::descriptors;
use ferry_sdk::{Constant, TypeDescriptor};
use serde_json::{json, Value as Json};

pub fn execute(type_name: Option<&str>, json: bool) -> anyhow::Result<()> {
    let selected: Vec<&TypeDescriptor> = descriptors()
        .into_iter()
        .filter(|d| type_name.map_or(true, |name| d.name() == name))
        .collect();
    if selected.is_empty() {
        if let Some(name) = type_name {
            anyhow::bail!("unknown type: {}", name);
        }
    }

    if json {
        let docs: Vec<Json> = selected.iter().map(|d| to_json(d)).collect();
        println!("{}", serde_json::to_string_pretty(&docs)?);
    } else {
        let blocks: Vec<String> = selected.iter().map(|d| render(d)).collect();
        println!("{}", blocks.join("\n"));
    }
    Ok(())
}

fn constant_text(value: &Constant) -> String {
    match value {
        Constant::Bool(b) => b.to_string(),
        Constant::Int(i) => i.to_string(),
        Constant::Double(d) => d.to_string(),
        Constant::String(s) => format!("{:?}", s),
    }
}

fn constant_json(value: &Constant) -> Json {
    match value {
        Constant::Bool(b) => json!(b),
        Constant::Int(i) => json!(i),
        Constant::Double(d) => json!(d),
        Constant::String(s) => json!(s),
    }
}

/// Human-readable listing of one type
pub fn render(descriptor: &TypeDescriptor) -> String {
    let mut out = format!("class {}\n", descriptor.name());
    for method in descriptor.methods().iter().filter(|m| !m.is_event()) {
        let prefix = if method.is_static { "static " } else { "" };
        out.push_str(&format!(
            "  {}{} -> {}\n",
            prefix,
            method.signature(),
            method.return_type
        ));
    }
    for property in descriptor.properties() {
        let access = match (property.readable, property.writable) {
            (true, true) => "rw",
            (true, false) => "ro",
            (false, true) => "wo",
            (false, false) => "--",
        };
        out.push_str(&format!(
            "  property {}: {} [{}]\n",
            property.name, property.type_id, access
        ));
    }
    for (_, event) in descriptor.events() {
        out.push_str(&format!("  event {}\n", event.signature()));
    }
    for (name, value) in descriptor.constants() {
        out.push_str(&format!("  const {} = {}\n", name, constant_text(value)));
    }
    out
}

/// JSON document for one type
pub fn to_json(descriptor: &TypeDescriptor) -> Json {
    let methods: Vec<Json> = descriptor
        .methods()
        .iter()
        .filter(|m| !m.is_event())
        .map(|m| {
            json!({
                "name": m.name,
                "parameters": m.parameter_types.iter().map(|t| t.name()).collect::<Vec<_>>(),
                "returns": m.return_type.name(),
                "static": m.is_static,
            })
        })
        .collect();
    let properties: Vec<Json> = descriptor
        .properties()
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "type": p.type_id.name(),
                "readable": p.readable,
                "writable": p.writable,
            })
        })
        .collect();
    let events: Vec<String> = descriptor.events().map(|(_, e)| e.signature()).collect();
    let constants: serde_json::Map<String, Json> = descriptor
        .constants()
        .iter()
        .map(|(name, value)| (name.clone(), constant_json(value)))
        .collect();

    json!({
        "name": descriptor.name(),
        "methods": methods,
        "properties": properties,
        "events": events,
        "constants": constants,
    })
}
