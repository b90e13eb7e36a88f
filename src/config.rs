use std::time::Duration;

use crate::ship::ShipType;

pub const BOARD_SIZE: u8 = 10;
pub const NUM_SHIPS: usize = 5;
pub const FLEET: [ShipType; NUM_SHIPS] = [
    ShipType::new("Carrier", 5),
    ShipType::new("Battleship", 4),
    ShipType::new("Cruiser", 3),
    ShipType::new("Submarine", 3),
    ShipType::new("Destroyer", 2),
];

/// Total number of ship segments used in the standard fleet.
pub const TOTAL_SHIP_CELLS: usize = 5 + 4 + 3 + 3 + 2;

/// Number of seats in a session.
pub const PLAYERS_PER_SESSION: usize = 2;

/// Look up a fleet entry by its display name.
pub fn fleet_ship(name: &str) -> Option<ShipType> {
    FLEET.iter().copied().find(|def| def.name() == name)
}

/// Runtime knobs for a [`GameServer`](crate::GameServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Background worker tasks pulling from the job queue.
    pub workers: usize,
    /// Cap on background jobs executing at the same time.
    pub max_in_flight: usize,
    /// Jobs that may wait in the queue before submissions are rejected.
    pub queue_capacity: usize,
    /// How long a player waits for the opponent to finish placing ships.
    pub readiness_timeout: Duration,
    /// Upper bound on how long shutdown waits for in-flight jobs.
    pub shutdown_deadline: Duration,
    /// Buffered events per subscriber before it starts lagging.
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let workers = num_cpus::get().max(1);
        Self {
            workers,
            max_in_flight: workers,
            queue_capacity: 1024,
            readiness_timeout: Duration::from_secs(120),
            shutdown_deadline: Duration::from_secs(5),
            event_capacity: 1024,
        }
    }
}

impl ServerConfig {
    /// Set the worker count. The admission cap follows it; call
    /// [`with_max_in_flight`](Self::with_max_in_flight) afterwards to override.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self.max_in_flight = self.workers;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    pub fn with_shutdown_deadline(mut self, deadline: Duration) -> Self {
        self.shutdown_deadline = deadline;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
