//! Script bridge example for luarecord
//!
//! This example demonstrates:
//! - Registering entity classes with and without the bridge
//! - Driving the persistence verbs from Lua
//! - Walking query results as lazy sequences
//! - Receiving lifecycle events in Lua
//!
//! Run with `RUST_LOG=debug` to see pipeline and hook decisions.

use anyhow::Context;
use luarecord::script::ScriptRuntime;
use luarecord::value::{attrs, Value};
use luarecord::{without_hooks, Bridge, ClassBuilder, Options, Registry};
use serde_json::json;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let registry = Registry::in_memory();
    registry.register(
        ClassBuilder::new("Author")
            .uses_bridge()
            .columns(&["name"])
            .has_many("posts", "Post", "author_id")
            .procedure("shout", |author, _| {
                let name = author.get("name").unwrap_or_default();
                Ok(Value::from(name.to_string().to_uppercase()))
            }),
    )?;
    let posts = registry.register(
        ClassBuilder::new("Post")
            .uses_bridge()
            .columns(&["title"])
            .column("status", "draft")
            .tag_type("tags")
            .belongs_to("author", "Author", "author_id")
            .require("title"),
    )?;
    registry.register(ClassBuilder::new("AuditLog").columns(&["line"]))?;

    let options = Options::default().script_timeout(Some(Duration::from_secs(5)));
    let runtime = ScriptRuntime::new(Bridge::new(registry, options)?)?;

    println!("Installing event handler...");
    runtime.execute(
        r#"
        function run_event_hooks(tag, entity)
            print("  event " .. tag .. " on " .. tostring(entity))
        end
    "#,
    )?;

    println!("Creating records from Lua...");
    runtime.execute(
        r#"
        local ann = bridge.create("Author", { name = "ann" })
        for i = 1, 3 do
            bridge.create("Post", { title = "post " .. i, author_id = ann.id, tag_list = { "lua" } })
        end
        print(ann.shout())
    "#,
    )?;

    println!("Walking a sequence...");
    let titles = runtime.eval(
        r#"
        local titles = {}
        local seq = bridge.find("Author", 1).posts
        while seq do
            titles[#titles + 1] = seq:head().title
            seq = seq:tail()
        end
        return titles
    "#,
    )?;
    println!("  titles => {}", titles.describe());

    println!("Bulk update with hooks disabled...");
    without_hooks(|| -> anyhow::Result<()> {
        for post in posts.all().entities()? {
            post.update(attrs(json!({"status": "published"})))?;
        }
        Ok(())
    })?;

    println!("Trying a class without the bridge...");
    match runtime.execute(r#"bridge.create("AuditLog", { line = "nope" })"#) {
        Ok(()) => println!("  unexpectedly allowed"),
        Err(e) => println!("  refused: {}", e),
    }

    let published = runtime
        .eval(r#"return bridge.find("Post", 2).status"#)
        .context("reading post 2")?;
    println!("Post 2 status => {}", published);

    Ok(())
}
