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

//! Validates a DML statement against per-environment policy before it is
//! allowed to plan or execute (spec §4.7). Pure and synchronous: every input
//! (`ProtectionLevel`, `QuerySafetySettings`, `DmlSafetyOptions`) is supplied
//! by the caller, so there is no catalog or remote call here — unlike the
//! semantic validator, this check never needs to be async.

use ppds_query_ast::ast::DeleteStatement;
use ppds_query_ast::ast::InsertSource;
use ppds_query_ast::ast::InsertStatement;
use ppds_query_ast::ast::Statement;
use ppds_query_ast::ast::UpdateStatement;

/// Dataverse environment classification (spec §4.7). Auto-detected from the
/// connected environment's type but always overridable by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionLevel {
    Development,
    Test,
    Production,
}

impl ProtectionLevel {
    /// `Production → Production`, everything else → `Development` (spec §4.7
    /// "Protection-level auto-detection").
    pub fn from_environment_type(environment_type: &str) -> Self {
        if environment_type.eq_ignore_ascii_case("production") {
            ProtectionLevel::Production
        } else {
            ProtectionLevel::Development
        }
    }
}

/// How DML targeting a different environment than the one it was authored
/// against is handled (spec §4.7 rule 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossEnvDmlPolicy {
    ReadOnly,
    Prompt,
    Allow,
}

/// Connection-scoped policy (spec §4.7 `QuerySafetySettings`).
#[derive(Debug, Clone)]
pub struct QuerySafetySettings {
    pub prevent_update_without_where: bool,
    pub prevent_delete_without_where: bool,
    pub cross_env_dml_policy: CrossEnvDmlPolicy,
}

impl Default for QuerySafetySettings {
    fn default() -> Self {
        QuerySafetySettings {
            prevent_update_without_where: true,
            prevent_delete_without_where: true,
            cross_env_dml_policy: CrossEnvDmlPolicy::Prompt,
        }
    }
}

/// Per-request overrides (spec §4.7 `DmlSafetyOptions`).
#[derive(Debug, Clone, Default)]
pub struct DmlSafetyOptions {
    pub is_confirmed: bool,
    pub is_dry_run: bool,
    pub no_limit: bool,
    pub row_cap: Option<u64>,
}

/// Decision surfaced back to the caller (spec §4.7). `error_code` is one of
/// the stable codes in `ppds_common_exception::ErrorCode` (as a string,
/// since this crate has no dependency on the executor the error eventually
/// flows through).
#[derive(Debug, Clone, PartialEq)]
pub struct DmlSafetyResult {
    pub is_blocked: bool,
    pub block_reason: Option<String>,
    pub error_code: Option<&'static str>,
    pub requires_confirmation: bool,
    pub requires_preview: bool,
    pub row_cap: u64,
    pub is_dry_run: bool,
}

impl DmlSafetyResult {
    fn allowed() -> Self {
        DmlSafetyResult {
            is_blocked: false,
            block_reason: None,
            error_code: None,
            requires_confirmation: false,
            requires_preview: false,
            row_cap: 0,
            is_dry_run: false,
        }
    }

    fn blocked(reason: impl Into<String>) -> Self {
        DmlSafetyResult {
            is_blocked: true,
            block_reason: Some(reason.into()),
            error_code: Some("Query.DmlBlocked"),
            requires_confirmation: false,
            requires_preview: false,
            row_cap: 0,
            is_dry_run: false,
        }
    }
}

pub struct DmlSafetyGuard;

impl DmlSafetyGuard {
    /// Evaluates a (possibly multi-statement/control-flow) statement tree
    /// (spec §4.7 rules 1-3).
    pub fn evaluate(
        stmt: &Statement,
        options: &DmlSafetyOptions,
        settings: &QuerySafetySettings,
        level: ProtectionLevel,
    ) -> DmlSafetyResult {
        let row_cap = if options.no_limit {
            u64::MAX
        } else {
            options.row_cap.unwrap_or(10_000)
        };

        let mut result = evaluate_statement(stmt, settings, row_cap);
        result.requires_confirmation = result.requires_confirmation || !options.is_confirmed;
        result.row_cap = row_cap;
        result.is_dry_run = options.is_dry_run;
        apply_protection_level(&mut result, level, options.is_confirmed);

        if result.is_blocked {
            log::warn!(
                target: "ppds_query_dml_guard",
                "DML blocked: {}",
                result.block_reason.as_deref().unwrap_or("unspecified")
            );
        }
        result
    }

    /// DML whose target environment differs from the one the connection was
    /// opened against (spec §4.7 rule 4). A separate entry point since it
    /// needs the source/target environment identity, not just a protection
    /// level.
    pub fn evaluate_cross_environment(
        stmt: &Statement,
        source_environment: &str,
        target_environment: &str,
        target_level: ProtectionLevel,
        settings: &QuerySafetySettings,
    ) -> DmlSafetyResult {
        if matches!(stmt, Statement::Select(_)) {
            let mut result = DmlSafetyResult::allowed();
            result.row_cap = u64::MAX;
            return result;
        }

        let mut result = match settings.cross_env_dml_policy {
            CrossEnvDmlPolicy::ReadOnly => DmlSafetyResult::blocked(format!(
                "cross-environment DML from '{}' to '{}' is disabled by policy",
                source_environment, target_environment
            )),
            CrossEnvDmlPolicy::Prompt => DmlSafetyResult {
                requires_confirmation: true,
                ..DmlSafetyResult::allowed()
            },
            CrossEnvDmlPolicy::Allow => DmlSafetyResult::allowed(),
        };

        if target_level == ProtectionLevel::Production {
            result.requires_confirmation = true;
        }
        result.row_cap = u64::MAX;

        if result.is_blocked {
            log::warn!(
                target: "ppds_query_dml_guard",
                "cross-environment DML blocked: {} -> {}",
                source_environment,
                target_environment
            );
        }
        result
    }
}

/// Recurses through control-flow bodies the same shape `ScriptExecution` and
/// `SemanticValidator` use, so the set of statements checked here always
/// matches what will actually run; plain (non-async) recursion needs no
/// boxing.
fn evaluate_statement(stmt: &Statement, settings: &QuerySafetySettings, row_cap: u64) -> DmlSafetyResult {
    match stmt {
        Statement::Select(_) => DmlSafetyResult::allowed(),
        Statement::Insert(s) => evaluate_insert(s, row_cap),
        Statement::Update(s) => evaluate_update(s, settings),
        Statement::Delete(s) => evaluate_delete(s, settings),
        Statement::Declare(_) | Statement::SetVariable(_) => DmlSafetyResult::allowed(),
        Statement::If(i) => {
            let then_result = evaluate_statement(&i.then_branch, settings, row_cap);
            match &i.else_branch {
                Some(else_branch) => {
                    most_restrictive(then_result, evaluate_statement(else_branch, settings, row_cap))
                }
                None => then_result,
            }
        }
        Statement::While(w) => evaluate_statement(&w.body, settings, row_cap),
        Statement::TryCatch(tc) => most_restrictive(
            evaluate_statement(&tc.try_block, settings, row_cap),
            evaluate_statement(&tc.catch_block, settings, row_cap),
        ),
        Statement::Block(stmts) => stmts
            .iter()
            .map(|s| evaluate_statement(s, settings, row_cap))
            .fold(DmlSafetyResult::allowed(), most_restrictive),
    }
}

/// `INSERT` row-cap check (spec §4.7 rule 1): a literal `VALUES` list longer
/// than the cap is rejected up front rather than failing midway through a
/// batch at execution time. `INSERT ... SELECT` row counts aren't known
/// until the source query runs, so it passes here unconditionally; the row
/// cap is still enforced by `DmlExecute` as rows are written.
fn evaluate_insert(s: &InsertStatement, row_cap: u64) -> DmlSafetyResult {
    match &s.source {
        InsertSource::Values(rows) if rows.len() as u64 > row_cap => DmlSafetyResult::blocked(format!(
            "INSERT supplies {} rows, exceeding the row cap of {}",
            rows.len(),
            row_cap
        )),
        _ => DmlSafetyResult::allowed(),
    }
}

fn evaluate_update(s: &UpdateStatement, settings: &QuerySafetySettings) -> DmlSafetyResult {
    if s.where_clause.is_some() {
        return DmlSafetyResult::allowed();
    }
    if settings.prevent_update_without_where {
        DmlSafetyResult::blocked(format!(
            "UPDATE without WHERE is not allowed. Add a WHERE clause to update only the intended rows of '{}'.",
            s.entity
        ))
    } else {
        DmlSafetyResult {
            requires_confirmation: true,
            ..DmlSafetyResult::allowed()
        }
    }
}

fn evaluate_delete(s: &DeleteStatement, settings: &QuerySafetySettings) -> DmlSafetyResult {
    if s.where_clause.is_some() {
        return DmlSafetyResult::allowed();
    }
    if settings.prevent_delete_without_where {
        DmlSafetyResult::blocked(format!(
            "DELETE without WHERE is not allowed. Use 'ppds truncate {}' for bulk deletion.",
            s.entity
        ))
    } else {
        DmlSafetyResult {
            requires_confirmation: true,
            ..DmlSafetyResult::allowed()
        }
    }
}

/// "the most restrictive contained result wins" (spec §4.7 rule 1).
fn most_restrictive(a: DmlSafetyResult, b: DmlSafetyResult) -> DmlSafetyResult {
    DmlSafetyResult {
        is_blocked: a.is_blocked || b.is_blocked,
        block_reason: match (&a.block_reason, &b.block_reason) {
            (Some(x), Some(y)) => Some(format!("{}; {}", x, y)),
            (Some(x), None) => Some(x.clone()),
            (None, Some(y)) => Some(y.clone()),
            (None, None) => None,
        },
        error_code: a.error_code.or(b.error_code),
        requires_confirmation: a.requires_confirmation || b.requires_confirmation,
        requires_preview: a.requires_preview || b.requires_preview,
        row_cap: a.row_cap,
        is_dry_run: a.is_dry_run,
    }
}

/// Protection-level overlay (spec §4.7 rule 3).
fn apply_protection_level(result: &mut DmlSafetyResult, level: ProtectionLevel, is_confirmed: bool) {
    match level {
        ProtectionLevel::Production if !is_confirmed => {
            result.requires_confirmation = true;
            result.requires_preview = true;
        }
        ProtectionLevel::Development if is_confirmed => {
            result.requires_confirmation = false;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppds_query_ast::ast::QueryHints;
    use ppds_query_ast::ast::SelectStatement;

    fn delete_without_where() -> Statement {
        Statement::Delete(DeleteStatement {
            entity: "account".to_string(),
            alias: None,
            where_clause: None,
            hints: QueryHints::default(),
        })
    }

    #[test]
    fn select_is_never_blocked() {
        let result = DmlSafetyGuard::evaluate(
            &Statement::Select(SelectStatement::default()),
            &DmlSafetyOptions::default(),
            &QuerySafetySettings::default(),
            ProtectionLevel::Production,
        );
        assert!(!result.is_blocked);
    }

    #[test]
    fn delete_without_where_is_blocked_by_default() {
        let result = DmlSafetyGuard::evaluate(
            &delete_without_where(),
            &DmlSafetyOptions::default(),
            &QuerySafetySettings::default(),
            ProtectionLevel::Development,
        );
        assert!(result.is_blocked);
        assert_eq!(result.error_code, Some("Query.DmlBlocked"));
        assert_eq!(
            result.block_reason.as_deref(),
            Some("DELETE without WHERE is not allowed. Use 'ppds truncate account' for bulk deletion.")
        );
    }

    #[test]
    fn update_without_where_names_the_entity_in_its_block_reason() {
        let stmt = Statement::Update(UpdateStatement {
            entity: "contact".to_string(),
            alias: None,
            set_clauses: vec![("statuscode".to_string(), ppds_query_ast::ast::Expr::Literal(ppds_query_ast::ast::Literal::Integer(1)))],
            where_clause: None,
            hints: QueryHints::default(),
        });
        let result = DmlSafetyGuard::evaluate(
            &stmt,
            &DmlSafetyOptions::default(),
            &QuerySafetySettings::default(),
            ProtectionLevel::Development,
        );
        assert!(result.is_blocked);
        assert!(result.block_reason.as_deref().unwrap().contains("'contact'"));
    }

    #[test]
    fn delete_without_where_downgrades_to_confirmation_when_flag_disabled() {
        let settings = QuerySafetySettings {
            prevent_delete_without_where: false,
            ..QuerySafetySettings::default()
        };
        let result = DmlSafetyGuard::evaluate(
            &delete_without_where(),
            &DmlSafetyOptions { is_confirmed: true, ..Default::default() },
            &settings,
            ProtectionLevel::Development,
        );
        assert!(!result.is_blocked);
        assert!(result.requires_confirmation);
    }

    #[test]
    fn row_cap_defaults_to_ten_thousand() {
        let result = DmlSafetyGuard::evaluate(
            &Statement::Select(SelectStatement::default()),
            &DmlSafetyOptions::default(),
            &QuerySafetySettings::default(),
            ProtectionLevel::Development,
        );
        assert_eq!(result.row_cap, 10_000);
    }

    #[test]
    fn no_limit_sets_row_cap_to_max() {
        let result = DmlSafetyGuard::evaluate(
            &Statement::Select(SelectStatement::default()),
            &DmlSafetyOptions { no_limit: true, ..Default::default() },
            &QuerySafetySettings::default(),
            ProtectionLevel::Development,
        );
        assert_eq!(result.row_cap, u64::MAX);
    }

    #[test]
    fn production_unconfirmed_requires_confirmation_and_preview() {
        let result = DmlSafetyGuard::evaluate(
            &Statement::Select(SelectStatement::default()),
            &DmlSafetyOptions::default(),
            &QuerySafetySettings::default(),
            ProtectionLevel::Production,
        );
        assert!(result.requires_confirmation);
        assert!(result.requires_preview);
    }

    #[test]
    fn development_confirmed_clears_confirmation() {
        let result = DmlSafetyGuard::evaluate(
            &Statement::Select(SelectStatement::default()),
            &DmlSafetyOptions { is_confirmed: true, ..Default::default() },
            &QuerySafetySettings::default(),
            ProtectionLevel::Development,
        );
        assert!(!result.requires_confirmation);
    }

    #[test]
    fn if_body_most_restrictive_branch_wins() {
        let stmt = Statement::If(ppds_query_ast::ast::IfStatement {
            condition: ppds_query_ast::ast::Expr::Literal(ppds_query_ast::ast::Literal::Boolean(true)),
            then_branch: Box::new(delete_without_where()),
            else_branch: Some(Box::new(Statement::Select(SelectStatement::default()))),
        });
        let result = DmlSafetyGuard::evaluate(
            &stmt,
            &DmlSafetyOptions { is_confirmed: true, ..Default::default() },
            &QuerySafetySettings::default(),
            ProtectionLevel::Development,
        );
        assert!(result.is_blocked);
    }

    #[test]
    fn insert_over_row_cap_is_blocked() {
        let stmt = Statement::Insert(InsertStatement {
            entity: "account".to_string(),
            columns: vec!["name".to_string()],
            source: InsertSource::Values(vec![vec![ppds_query_ast::ast::Expr::Literal(ppds_query_ast::ast::Literal::String(
                "x".to_string(),
            ))]; 3]),
            hints: QueryHints::default(),
        });
        let result = DmlSafetyGuard::evaluate(
            &stmt,
            &DmlSafetyOptions { row_cap: Some(2), is_confirmed: true, ..Default::default() },
            &QuerySafetySettings::default(),
            ProtectionLevel::Development,
        );
        assert!(result.is_blocked);
    }

    #[test]
    fn cross_environment_read_only_policy_blocks_dml() {
        let settings = QuerySafetySettings {
            cross_env_dml_policy: CrossEnvDmlPolicy::ReadOnly,
            ..QuerySafetySettings::default()
        };
        let result = DmlSafetyGuard::evaluate_cross_environment(
            &delete_without_where(),
            "dev",
            "prod",
            ProtectionLevel::Production,
            &settings,
        );
        assert!(result.is_blocked);
    }

    #[test]
    fn cross_environment_select_always_allowed() {
        let settings = QuerySafetySettings {
            cross_env_dml_policy: CrossEnvDmlPolicy::ReadOnly,
            ..QuerySafetySettings::default()
        };
        let result = DmlSafetyGuard::evaluate_cross_environment(
            &Statement::Select(SelectStatement::default()),
            "dev",
            "prod",
            ProtectionLevel::Production,
            &settings,
        );
        assert!(!result.is_blocked);
    }
}
