use crate::clock::{Clock, SystemClock};
use crate::flake_id::FlakeId;
use async_trait::async_trait;
use jiff::Timestamp;
use keyway_core::{AllocatorError, IdentifierAllocator};
use parking_lot::Mutex;
use tracing::trace;
use typed_builder::TypedBuilder;

const MAX_TIMESTAMP_SECONDS: u64 = (1_u64 << 40) - 1;
const MAX_SEQUENCE: u16 = (1 << 14) - 1;

/// Highest node id that fits into a [`FlakeId`].
pub const MAX_NODE_ID: u16 = (1 << 10) - 1;

/// Configures a Flake generator instance.
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct FlakeSettings {
    /// A unique node index in the range `[0, 1023]`.
    #[builder]
    pub node_id: u16,
    /// Custom epoch used as the zero point for the 40-bit timestamp field.
    ///
    /// Flake math runs at whole-second precision (`Timestamp::as_second`).
    #[builder]
    pub start_epoch: Timestamp,
}

/// Last issued (second, sequence) pair.
#[derive(Debug, Default)]
struct Issued {
    second: Option<i64>,
    sequence: u16,
}

/// Outcome of one attempt under the state lock.
enum Attempt {
    Id(FlakeId),
    /// The second is used up or the clock went backwards; retry once the
    /// clock reaches this instant.
    RetryAt(Timestamp),
}

/// Coordination-free allocator with Sonyflake-style wait-on-overflow semantics.
///
/// Identifiers are unique as long as no two live nodes share a node id.
/// Waiting happens outside the state lock and on the async clock, so a
/// caller that has to wait can be cancelled and never stalls its thread.
pub struct Flake<C: Clock> {
    epoch_second: i64,
    node_id: u16,
    clock: C,
    issued: Mutex<Issued>,
}

impl Flake<SystemClock> {
    /// Creates a generator backed by the real system clock.
    pub fn new(settings: FlakeSettings) -> Result<Self, AllocatorError> {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock> Flake<C> {
    pub fn with_clock(settings: FlakeSettings, clock: C) -> Result<Self, AllocatorError> {
        if settings.node_id > MAX_NODE_ID {
            return Err(AllocatorError::InvalidNodeId {
                node_id: settings.node_id,
                max_node_id: MAX_NODE_ID,
            });
        }

        let now = clock.now();
        if settings.start_epoch > now {
            return Err(AllocatorError::EpochAhead {
                epoch: settings.start_epoch,
                now,
            });
        }

        Ok(Self {
            epoch_second: settings.start_epoch.as_second(),
            node_id: settings.node_id,
            clock,
            issued: Mutex::new(Issued::default()),
        })
    }

    /// Generates the next unique FlakeId, waiting for the clock when the
    /// current second has no sequence numbers left or time went backwards.
    pub async fn next_flake(&self) -> Result<FlakeId, AllocatorError> {
        loop {
            match self.attempt()? {
                Attempt::Id(id) => return Ok(id),
                Attempt::RetryAt(at) => {
                    trace!(node_id = self.node_id, retry_at = %at, "waiting for the clock");
                    self.clock.sleep_until(at).await;
                }
            }
        }
    }

    fn attempt(&self) -> Result<Attempt, AllocatorError> {
        let mut issued = self.issued.lock();
        let second = self.clock.now().as_second();

        let sequence = match issued.second {
            Some(last) if second < last => {
                // Issuing now could repeat a (second, sequence) pair.
                return Ok(Attempt::RetryAt(Self::start_of(last)?));
            }
            Some(last) if second == last => {
                if issued.sequence == MAX_SEQUENCE {
                    return Ok(Attempt::RetryAt(Self::start_of(last + 1)?));
                }
                issued.sequence + 1
            }
            _ => 0,
        };

        let elapsed = u64::try_from(second - self.epoch_second)
            .ok()
            .filter(|elapsed| *elapsed <= MAX_TIMESTAMP_SECONDS)
            .ok_or(AllocatorError::OverTimeLimit)?;

        issued.second = Some(second);
        issued.sequence = sequence;

        Ok(Attempt::Id(
            FlakeId::new()
                .with_timestamp(elapsed)
                .with_node_id(self.node_id)
                .with_sequence(sequence),
        ))
    }

    fn start_of(second: i64) -> Result<Timestamp, AllocatorError> {
        Timestamp::from_second(second).map_err(|_| AllocatorError::OverTimeLimit)
    }
}

#[async_trait]
impl<C: Clock> IdentifierAllocator for Flake<C> {
    async fn next_id(&self) -> Result<u64, AllocatorError> {
        self.next_flake().await.map(FlakeId::as_u64)
    }
}
