use crate::{
    Error,
    conn::{Cmd, Connection},
};

/// 通过原子自增分配 id。后续写入失败不会回退计数器，id 只保证唯一和递增
pub async fn next_id<C: Connection>(conn: &C, counter_key: &str) -> Result<u64, Error> {
    let id = conn.query(Cmd::incr(counter_key)).await?.into_int()?;
    u64::try_from(id)
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| {
            Error::Store(format!(
                "counter '{}' returned a non-positive id {}",
                counter_key, id
            ))
        })
}
