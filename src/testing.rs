use crate::auth::{ExternalPrincipal, RequestContext};
use crate::core::db::Db;
use crate::users::acting_user_id;

pub fn principal(name: &str) -> ExternalPrincipal {
    ExternalPrincipal::new(format!("idp|{name}")).with_email(format!("{name}@example.com"))
}

/// A signed-in context for `name` together with its internal user id.
pub fn signed_in<'a>(db: &'a Db, name: &str) -> (RequestContext<'a>, String) {
    let ctx = RequestContext::new(db, Some(principal(name)));
    let id = acting_user_id(&ctx).unwrap();
    (ctx, id)
}

pub fn count_rows(db: &Db, table: &str) -> i64 {
    db.with_conn(|c| Ok(c.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?))
        .unwrap()
}
