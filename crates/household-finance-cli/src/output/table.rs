use serde_json::Value;
use tabled::{builder::Builder, Table};

/// Format output as a table using the tabled crate.
///
/// Objects render as Field/Value pairs with nested arrays of objects
/// (installments, payments, transfers) as their own sub-tables; arrays of
/// objects render as one table with a column per key.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            print_flat_object(map);

            // Nested collections get their own tables.
            for (key, val) in map {
                if let Value::Array(arr) = val {
                    if arr.iter().any(|v| v.is_object()) {
                        println!("\n{}:", key);
                        print_array_table(arr);
                    }
                }
            }

            print_warnings(map);
        }
        Value::Array(arr) => print_array_table(arr),
        _ => println!("{}", value),
    }
}

fn print_flat_object(map: &serde_json::Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        if key == "warnings" {
            continue;
        }
        match val {
            Value::Array(arr) if arr.iter().any(|v| v.is_object()) => continue,
            Value::Object(_) => {
                for (sub_key, sub_val) in val.as_object().into_iter().flatten() {
                    builder.push_record([
                        format!("{key}.{sub_key}").as_str(),
                        &format_value(sub_val),
                    ]);
                }
            }
            _ => {
                builder.push_record([key.as_str(), &format_value(val)]);
            }
        }
    }
    let table = Table::from(builder);
    println!("{}", table);
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    // Collect the union of keys across rows, first-seen order.
    let mut columns: Vec<String> = Vec::new();
    for item in arr {
        if let Value::Object(map) = item {
            for key in map.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    if columns.is_empty() {
        for item in arr {
            println!("{}", format_value(item));
        }
        return;
    }

    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(String::as_str));
    for item in arr {
        if let Value::Object(map) = item {
            let row: Vec<String> = columns
                .iter()
                .map(|c| map.get(c).map(format_value).unwrap_or_default())
                .collect();
            builder.push_record(row);
        }
    }
    let table = Table::from(builder);
    println!("{}", table);
}

fn print_warnings(map: &serde_json::Map<String, Value>) {
    if let Some(Value::Array(warnings)) = map.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(arr) => arr
            .iter()
            .map(format_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
