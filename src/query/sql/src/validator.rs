// Copyright 2024 PPDS Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use ppds_common_exception::Result;
use ppds_query_ast::ast::DeleteStatement;
use ppds_query_ast::ast::InsertStatement;
use ppds_query_ast::ast::SelectStatement;
use ppds_query_ast::ast::Statement;
use ppds_query_ast::ast::UpdateStatement;
use ppds_query_catalog::MetadataCatalog;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Diagnostic severity (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// `{offset, length, severity, message}` (spec §4.2). The AST carries no
/// source spans, so every diagnostic raised here anchors at `(0, 0)`; a
/// validator wired to the parser's token stream could recover real spans by
/// re-resolving the offending name against the original token list.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub offset: usize,
    pub length: usize,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            offset: 0,
            length: 0,
            severity: Severity::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            offset: 0,
            length: 0,
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

/// Checks a parsed statement against a cached metadata catalog (spec §4.2).
/// Never throws: any failure from the catalog collapses to a single `Error`
/// diagnostic covering the whole input.
pub struct SemanticValidator {
    metadata: Arc<dyn MetadataCatalog>,
}

impl SemanticValidator {
    pub fn new(metadata: Arc<dyn MetadataCatalog>) -> Self {
        SemanticValidator { metadata }
    }

    pub async fn validate(&self, stmt: &Statement) -> Vec<Diagnostic> {
        match self.try_validate(stmt).await {
            Ok(diags) => diags,
            Err(e) => vec![Diagnostic::error(format!(
                "semantic validation could not run: {}",
                e.message()
            ))],
        }
    }

    async fn try_validate(&self, stmt: &Statement) -> Result<Vec<Diagnostic>> {
        let entities = self.metadata.entities().await?;
        let mut diags = Vec::new();
        self.validate_statement(stmt, &entities, &mut diags).await?;
        Ok(diags)
    }

    /// Recurses through control-flow bodies the same way `ScriptExecution`
    /// does at runtime; boxed since `async fn` cannot call itself directly.
    fn validate_statement<'a>(
        &'a self,
        stmt: &'a Statement,
        entities: &'a [String],
        diags: &'a mut Vec<Diagnostic>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            match stmt {
                Statement::Select(s) => self.validate_select(s, entities, diags),
                Statement::Insert(s) => self.validate_insert(s, entities, diags).await?,
                Statement::Update(s) => self.validate_update(s, entities, diags).await?,
                Statement::Delete(s) => self.validate_delete(s, entities, diags),
                Statement::Declare(_) | Statement::SetVariable(_) => {}
                Statement::If(i) => {
                    self.validate_statement(&i.then_branch, entities, diags).await?;
                    if let Some(else_branch) = &i.else_branch {
                        self.validate_statement(else_branch, entities, diags).await?;
                    }
                }
                Statement::While(w) => {
                    self.validate_statement(&w.body, entities, diags).await?;
                }
                Statement::TryCatch(tc) => {
                    self.validate_statement(&tc.try_block, entities, diags).await?;
                    self.validate_statement(&tc.catch_block, entities, diags).await?;
                }
                Statement::Block(stmts) => {
                    for s in stmts {
                        self.validate_statement(s, entities, diags).await?;
                    }
                }
            }
            Ok(())
        })
    }

    fn check_entity(&self, name: &str, entities: &[String], diags: &mut Vec<Diagnostic>) {
        if !entities.iter().any(|e| e.eq_ignore_ascii_case(name)) {
            diags.push(Diagnostic::error(format!("unknown entity '{}'", name)));
        }
    }

    /// Walks a SELECT's FROM clause and its UNION chain; only entity
    /// existence is checked here (attribute checks need an async catalog
    /// call and are only required for INSERT/UPDATE targets per spec §4.2).
    fn validate_select(&self, s: &SelectStatement, entities: &[String], diags: &mut Vec<Diagnostic>) {
        let mut queue = vec![s];
        while let Some(sel) = queue.pop() {
            for table in &sel.from {
                self.check_entity(&table.entity, entities, diags);
                for join in &table.joins {
                    self.check_entity(&join.entity, entities, diags);
                }
            }
            for op in &sel.set_ops {
                queue.push(&op.select);
            }
        }
    }

    async fn validate_insert(
        &self,
        s: &InsertStatement,
        entities: &[String],
        diags: &mut Vec<Diagnostic>,
    ) -> Result<()> {
        self.check_entity(&s.entity, entities, diags);
        if let ppds_query_ast::ast::InsertSource::Select(select) = &s.source {
            self.validate_select(select, entities, diags);
        }
        if entities.iter().any(|e| e.eq_ignore_ascii_case(&s.entity)) {
            let attrs = self.metadata.attributes(&s.entity).await?;
            for column in &s.columns {
                if !attrs.iter().any(|a| a.eq_ignore_ascii_case(column)) {
                    diags.push(Diagnostic::warning(format!(
                        "unknown attribute '{}' on entity '{}'",
                        column, s.entity
                    )));
                }
            }
        }
        Ok(())
    }

    async fn validate_update(
        &self,
        s: &UpdateStatement,
        entities: &[String],
        diags: &mut Vec<Diagnostic>,
    ) -> Result<()> {
        self.check_entity(&s.entity, entities, diags);
        if entities.iter().any(|e| e.eq_ignore_ascii_case(&s.entity)) {
            let attrs = self.metadata.attributes(&s.entity).await?;
            for (column, _) in &s.set_clauses {
                if !attrs.iter().any(|a| a.eq_ignore_ascii_case(column)) {
                    diags.push(Diagnostic::warning(format!(
                        "unknown attribute '{}' on entity '{}'",
                        column, s.entity
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_delete(&self, s: &DeleteStatement, entities: &[String], diags: &mut Vec<Diagnostic>) {
        self.check_entity(&s.entity, entities, diags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppds_query_ast::ast::DeleteStatement;

    #[tokio::test]
    async fn unknown_entity_produces_error_diagnostic() {
        let fake = ppds_query_catalog::fake::FakeRemoteExecutor::new();
        fake.set_entities(vec!["account".to_string()]);
        let validator = SemanticValidator::new(Arc::new(fake));
        let stmt = Statement::Delete(DeleteStatement {
            entity: "ghost".to_string(),
            alias: None,
            where_clause: None,
            hints: Default::default(),
        });
        let diags = validator.validate(&stmt).await;
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn known_entity_produces_no_diagnostics() {
        let fake = ppds_query_catalog::fake::FakeRemoteExecutor::new();
        fake.set_entities(vec!["account".to_string()]);
        let validator = SemanticValidator::new(Arc::new(fake));
        let stmt = Statement::Delete(DeleteStatement {
            entity: "account".to_string(),
            alias: None,
            where_clause: None,
            hints: Default::default(),
        });
        let diags = validator.validate(&stmt).await;
        assert!(diags.is_empty());
    }
}
