//! Query chains over one module: compile clauses, build the request, run it.

use serde::{Deserialize, Serialize};

use crate::compiler::ExpressionCompiler;
use crate::download::Downloader;
use crate::expr::Expr;
use crate::params::{row_to_json, QueryParameters, Row};
use crate::request::HttpQueryParameter;
use crate::response::XmlDocument;
use crate::types::{ModuleDescriptor, Property, WikiError, WikiResult};

/// A declarative query, as loaded from a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    #[serde(default)]
    pub filter: Option<Expr>,
    #[serde(default)]
    pub order_by: Option<OrderSpec>,
    #[serde(default)]
    pub select: Option<Expr>,
}

/// Sort clause of a [`QuerySpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub key: Expr,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

/// Rows returned by a query, after projection.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    List(Vec<serde_json::Value>),
    Single(serde_json::Value),
}

/// One query chain over a module.
///
/// Every clause method returns a new query; the receiver stays usable.
#[derive(Debug, Clone)]
pub struct WikiQuery<'m> {
    compiler: ExpressionCompiler<'m>,
    params: QueryParameters,
}

impl<'m> WikiQuery<'m> {
    pub fn new(module: &'m ModuleDescriptor) -> Self {
        Self {
            compiler: ExpressionCompiler::new(module),
            params: QueryParameters::new(),
        }
    }

    /// Apply every clause of `spec`, in filter, order, select order.
    pub fn from_spec(module: &'m ModuleDescriptor, spec: &QuerySpec) -> WikiResult<Self> {
        let mut query = Self::new(module);
        if let Some(filter) = &spec.filter {
            query = query.filter(filter)?;
        }
        if let Some(order) = &spec.order_by {
            query = query.order_by(&order.key, order.ascending)?;
        }
        if let Some(select) = &spec.select {
            query = query.select(select)?;
        }
        Ok(query)
    }

    pub fn module(&self) -> &'m ModuleDescriptor {
        self.compiler.module()
    }

    pub fn parameters(&self) -> &QueryParameters {
        &self.params
    }

    pub fn filter(&self, predicate: &Expr) -> WikiResult<Self> {
        Ok(self.with_params(self.compiler.compile_filter(predicate, &self.params)?))
    }

    pub fn order_by(&self, key: &Expr, ascending: bool) -> WikiResult<Self> {
        Ok(self.with_params(self.compiler.compile_order(key, &self.params, ascending)?))
    }

    pub fn select(&self, selector: &Expr) -> WikiResult<Self> {
        Ok(self.with_params(self.compiler.compile_projection(selector, &self.params)?))
    }

    /// Select rows unchanged, declaring them to have `declared_shape`.
    pub fn select_identity(&self, declared_shape: &[Property]) -> WikiResult<Self> {
        Ok(self.with_params(self.compiler.compile_identity_projection(
            &Expr::Identity,
            &self.params,
            declared_shape,
        )?))
    }

    fn with_params(&self, params: QueryParameters) -> Self {
        Self {
            compiler: self.compiler,
            params,
        }
    }

    /// The ordered wire parameters for this query.
    pub fn to_request(&self) -> Vec<HttpQueryParameter> {
        build_request(self.module(), &self.params)
    }

    /// Execute the query and project the result rows.
    pub async fn execute(&self, downloader: &Downloader) -> WikiResult<QueryResult> {
        let document = downloader.download(&self.to_request()).await?;
        self.read_result(&document)
    }

    /// Locate and project the result rows of a response.
    pub fn read_result(&self, document: &XmlDocument) -> WikiResult<QueryResult> {
        document.check_api_error()?;
        let project = |row: &Row| match self.params.projector() {
            Some(projector) => projector.apply(row),
            None => row_to_json(row),
        };

        let module = self.module();
        if module.list_result {
            // an empty document or a missing list node means no rows
            let rows: Vec<serde_json::Value> = document
                .find(&["api", "query", module.name.as_str()])
                .map(|list| list.children.iter().map(|c| project(&c.to_row())).collect())
                .unwrap_or_default();
            Ok(QueryResult::List(rows))
        } else {
            let query = document.find(&["api", "query"]).ok_or_else(|| WikiError::Protocol {
                message: format!("no <query> element in response for '{}'", module.name),
                excerpt: document
                    .root
                    .as_ref()
                    .map(|r| r.to_string().chars().take(200).collect())
                    .unwrap_or_default(),
            })?;
            Ok(QueryResult::Single(project(&query.single_child()?.to_row())))
        }
    }
}

/// Build the ordered wire parameters for `params` over `module`.
///
/// Module-level fields come first, then filter values in compilation
/// order, then sort fields. Filter, sort and prop names carry the module's
/// parameter prefix.
pub fn build_request(module: &ModuleDescriptor, params: &QueryParameters) -> Vec<HttpQueryParameter> {
    let prefix = module.prefix.as_str();
    let mut request = vec![HttpQueryParameter::value("action", "query")];

    if module.list_result {
        request.push(HttpQueryParameter::value("list", module.name.as_str()));
    } else {
        request.push(HttpQueryParameter::value("meta", module.name.as_str()));
    }

    // an explicit empty selection is sent as an empty prop list
    let (props, narrowed): (Vec<&str>, bool) = match params.properties() {
        Some(selected) => (selected.iter().map(String::as_str).collect(), true),
        None => (module.properties.iter().map(|p| p.name.as_str()).collect(), false),
    };
    let props: Vec<&str> = props.into_iter().filter(|p| *p != "*").collect();
    if narrowed || !props.is_empty() {
        request.push(HttpQueryParameter::value(format!("{prefix}prop"), props.join("|")));
    }

    if module.list_result {
        request.push(HttpQueryParameter::value(format!("{prefix}limit"), "max"));
    }

    for (name, value) in params.values() {
        request.push(HttpQueryParameter::value(format!("{prefix}{name}"), value.as_str()));
    }

    if let Some(sort) = params.sort() {
        request.push(HttpQueryParameter::value(format!("{prefix}sort"), sort));
    }
    if let Some(ascending) = params.ascending() {
        let dir = if ascending { "ascending" } else { "descending" };
        request.push(HttpQueryParameter::value(format!("{prefix}dir"), dir));
    }

    request
}
