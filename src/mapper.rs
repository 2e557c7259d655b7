//! Mapper invocation driver.

use tracing::{debug, info_span, Instrument};

use crate::emitter::{Emitter, Stage};
use crate::error::{Error, Result};
use crate::event::{JobContext, MapperEvent, MapperOutput};
use crate::store::ObjectStore;
use crate::MapperFn;

/// Drive one mapper invocation: fetch the input object, run the user map
/// function against an emitter, flush, and wrap the user result.
///
/// Exactly one shard object is written per successful invocation, even
/// when the map function emits nothing. Any storage or user-function
/// failure is fatal and propagated; the runtime may re-drive the whole
/// invocation, which overwrites the same shard path.
pub async fn handle(
    store: &dyn ObjectStore,
    event: MapperEvent,
    ctx: &JobContext,
    mapper_fn: MapperFn,
) -> Result<MapperOutput> {
    let span = info_span!("mapper", job_id = %ctx.job_id, input = %event.key);
    async {
        let input_bucket = ctx.require_input_bucket()?;

        let data = store
            .get_object(input_bucket, &event.key)
            .await
            .map_err(Error::Storage)?;
        debug!(bytes = data.len(), "fetched input object");

        let mut em = Emitter::new(
            &ctx.output_bucket,
            &ctx.output_prefix,
            &ctx.job_id,
            Stage::Mapper,
            &event.key,
        );

        let mapper_result = mapper_fn(&event.key, data, &mut em).map_err(Error::UserFunction)?;
        debug!(emitted = em.len(), "map function returned");

        em.flush(store).await?;

        Ok(MapperOutput { mapper_result })
    }
    .instrument(span)
    .await
}
