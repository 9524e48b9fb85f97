use std::fmt::Debug;

use serde::Serialize;
use tokio_postgres::types::{self, ToSql};

pub type PgJson<T> = types::Json<T>;

pub type ParamsValue<'a> = &'a (dyn ToSql + Sync);
pub type ParamsVec<'a> = Vec<&'a (dyn ToSql + Sync)>;
pub type ParamsArray<'a, const N: usize> = [&'a (dyn ToSql + Sync); N];

pub fn push_param<'a, T>(params: &mut ParamsVec<'a>, v: &'a T) -> usize
where
    T: ToSql + Sync
{
    params.push(v);
    params.len()
}

#[inline]
pub fn ser_to_sql<T>(value: T) -> PgJson<T>
where
    T: Serialize + Debug
{
    types::Json(value)
}
