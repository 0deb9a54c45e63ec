//! Host facade handed to plugin entry points.
//!
//! The facade is the only handle plugin code receives into the running
//! application. It exposes a narrow capability surface — widget
//! registration, view refresh, and store access — instead of raw internals.

use mlua::{Lua, RegistryKey, Table, UserData, UserDataMethods};
use std::cell::RefCell;
use std::rc::Rc;

use crate::browser::view::RecordView;
use crate::store::{Database, Row, Value};

/// What pressing a tracked widget does
pub enum WidgetAction {
    /// Host-native: re-run plugin discovery
    ReloadPlugins,
    /// Plugin-supplied Lua callback, pinned in the interpreter registry
    Lua(RegistryKey),
    /// Label-only widget with no behavior
    Inert,
}

/// An interactive element on the host surface. Plugins create these through
/// [`HostFacade`]; placement and lifetime bookkeeping stay with the host so
/// the full set can be enumerated later.
pub struct TrackedWidget {
    /// Logical name of the plugin that registered it, or `host`
    pub owner: String,
    pub label: String,
    pub action: WidgetAction,
}

impl TrackedWidget {
    pub fn host_native(label: &str, action: WidgetAction) -> Self {
        Self {
            owner: "host".to_string(),
            label: label.to_string(),
            action,
        }
    }
}

pub type SharedWidgets = Rc<RefCell<Vec<TrackedWidget>>>;

/// Shared application state the facade operates on. Everything lives on the
/// single UI thread, so plain `Rc<RefCell<_>>` handles are enough.
#[derive(Clone)]
pub struct HostContext {
    pub db: Rc<RefCell<Database>>,
    pub view: Rc<RefCell<RecordView>>,
    pub widgets: SharedWidgets,
    /// Logical name of the unit whose entry point is currently running;
    /// used to stamp ownership onto registered widgets
    pub active_unit: Rc<RefCell<Option<String>>>,
}

impl HostContext {
    pub fn new(db: Rc<RefCell<Database>>, view: Rc<RefCell<RecordView>>) -> Self {
        Self {
            db,
            view,
            widgets: Rc::new(RefCell::new(Vec::new())),
            active_unit: Rc::new(RefCell::new(None)),
        }
    }
}

/// The capability object passed to every plugin's `register_plugin`
pub struct HostFacade {
    ctx: HostContext,
}

impl HostFacade {
    pub fn new(ctx: HostContext) -> Self {
        Self { ctx }
    }
}

impl UserData for HostFacade {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        // host:register_widget({ label = "...", on_activate = function() ... end })
        methods.add_method("register_widget", |lua, this, spec: Table| {
            let label: String = spec.get("label")?;
            let action = match spec.get::<_, Option<mlua::Function>>("on_activate")? {
                Some(callback) => WidgetAction::Lua(lua.create_registry_value(callback)?),
                None => WidgetAction::Inert,
            };
            let owner = this
                .ctx
                .active_unit
                .borrow()
                .clone()
                .unwrap_or_else(|| "host".to_string());

            this.ctx.widgets.borrow_mut().push(TrackedWidget {
                owner,
                label,
                action,
            });
            Ok(())
        });

        // host:refresh() -> record count
        methods.add_method("refresh", |_, this, ()| {
            let db = this.ctx.db.borrow();
            let count = this
                .ctx
                .view
                .borrow_mut()
                .refresh(&db)
                .map_err(mlua::Error::external)?;
            Ok(count)
        });

        // host:query(sql, params?) -> sequence of row sequences
        methods.add_method(
            "query",
            |lua, this, (sql, params): (String, Option<Table>)| {
                let params = params_from_lua(params)?;
                let rows = this
                    .ctx
                    .db
                    .borrow()
                    .query(&sql, &params)
                    .map_err(mlua::Error::external)?;
                rows_to_lua(lua, &rows)
            },
        );

        // host:execute(sql, params?) -> affected row count
        methods.add_method(
            "execute",
            |_, this, (sql, params): (String, Option<Table>)| {
                let params = params_from_lua(params)?;
                let affected = this
                    .ctx
                    .db
                    .borrow()
                    .execute(&sql, &params)
                    .map_err(mlua::Error::external)?;
                Ok(affected)
            },
        );
    }
}

fn params_from_lua(params: Option<Table>) -> mlua::Result<Vec<Value>> {
    let mut out = Vec::new();
    if let Some(table) = params {
        for item in table.sequence_values::<mlua::Value>() {
            out.push(value_from_lua(item?)?);
        }
    }
    Ok(out)
}

fn value_from_lua(value: mlua::Value) -> mlua::Result<Value> {
    match value {
        mlua::Value::Nil => Ok(Value::Null),
        mlua::Value::Boolean(b) => Ok(Value::Integer(i64::from(b))),
        mlua::Value::Integer(i) => Ok(Value::Integer(i)),
        mlua::Value::Number(n) => Ok(Value::Real(n)),
        mlua::Value::String(s) => Ok(Value::Text(s.to_str()?.to_string())),
        other => Err(mlua::Error::FromLuaConversionError {
            from: other.type_name(),
            to: "statement parameter",
            message: Some("expected nil, boolean, number, or string".to_string()),
        }),
    }
}

fn value_to_lua<'lua>(lua: &'lua Lua, value: &Value) -> mlua::Result<mlua::Value<'lua>> {
    Ok(match value {
        Value::Null => mlua::Value::Nil,
        Value::Integer(i) => mlua::Value::Integer(*i),
        Value::Real(r) => mlua::Value::Number(*r),
        Value::Text(s) => mlua::Value::String(lua.create_string(s)?),
    })
}

fn rows_to_lua<'lua>(lua: &'lua Lua, rows: &[Row]) -> mlua::Result<Table<'lua>> {
    let out = lua.create_table()?;
    for (row_index, row) in rows.iter().enumerate() {
        let lua_row = lua.create_table()?;
        for (col_index, value) in row.iter().enumerate() {
            lua_row.set(col_index + 1, value_to_lua(lua, value)?)?;
        }
        out.set(row_index + 1, lua_row)?;
    }
    Ok(out)
}
