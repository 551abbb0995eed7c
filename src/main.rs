//! recordql 演示程序：交互式过滤查询 REPL
//!
//! 把补全引擎接到 rustyline 上，按 Tab 获取 schema 感知的补全；
//! 每输入一行查询就走一遍完整的词法→语法→验证→SQL流水线。

use anyhow::Result;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

use recordql::{
    apply_search, describe, parse_query, suggest, tokenize, translate, SchemaConfig, SchemaModel,
    SqlBackend,
};

/// 把补全引擎适配成 rustyline 的 Completer
struct QueryHelper {
    model: SchemaModel,
}

impl Completer for QueryHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let suggestions = suggest(line, pos, &self.model);
        // 同一次补全的所有候选共享同一个替换起点
        let start = suggestions.first().map_or(pos, |s| s.replace.start);
        let pairs = suggestions
            .into_iter()
            .map(|s| Pair {
                display: s.label,
                replacement: s.insert,
            })
            .collect();
        Ok((start, pairs))
    }
}

impl Hinter for QueryHelper {
    type Hint = String;
}

impl Highlighter for QueryHelper {}
impl Validator for QueryHelper {}
impl Helper for QueryHelper {}

/// 创建schema模型，优先使用JSON配置，失败时使用内置演示schema
fn load_model() -> SchemaModel {
    match SchemaConfig::from_json_file("schema.json").and_then(SchemaConfig::into_model) {
        Ok(model) => {
            println!("✅ 成功从JSON配置文件加载schema: schema.json");
            model
        }
        Err(e) => {
            println!("⚠️ 无法加载JSON配置文件 ({e}), 使用内置演示schema");
            SchemaConfig::default()
                .into_model()
                .expect("内置演示schema应当有效")
        }
    }
}

fn main() -> Result<()> {
    println!("--- recordql: 过滤查询引擎演示 ---");

    let model = load_model();
    let backend = SqlBackend::new();

    println!("\n[Schema快照] (introspection端点返回的内容):");
    println!("{}", serde_json::to_string_pretty(&describe(&model))?);

    println!("\n输入过滤查询，Tab 触发补全，exit 退出。示例:");
    println!("  price > 10 and genre = \"fiction\"");
    println!("  author.country.name ~ \"land\" or not available = true\n");

    let mut rl: Editor<QueryHelper, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(QueryHelper {
        model: model.clone(),
    }));

    loop {
        match rl.readline("query> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                    break;
                }
                let _ = rl.add_history_entry(line);
                run_query(line, &model, &backend);
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

/// 按流水线逐步展示一条查询的处理过程
fn run_query(line: &str, model: &SchemaModel, backend: &SqlBackend) {
    // 1. 词法分析
    match tokenize(line) {
        Ok(tokens) => println!("[步骤 1] 词法分析: {} 个 token", tokens.len()),
        Err(e) => println!("[步骤 1] 词法错误: {e}"),
    }

    // 2. 语法分析
    match parse_query(line) {
        Ok(ast) => {
            println!("[步骤 2] 语法分析: {ast}");

            // 3. 验证与翻译
            match translate(&ast, model) {
                Ok(_) => println!("[步骤 3] 验证通过"),
                Err(e) => println!("[步骤 3] 验证失败: {e}"),
            }
        }
        Err(e) => println!("[步骤 2] 语法错误: {e}"),
    }

    // 4. apply-search边界：失败时降级为空结果加一条警告
    let outcome = apply_search(backend.select_from(model), line, model, backend);
    if let Some(warning) = &outcome.warning {
        println!("⚠️ {warning}");
    }
    println!("[生成的 SQL]:\n{}\n", SqlBackend::to_sql(&outcome.select));
}
