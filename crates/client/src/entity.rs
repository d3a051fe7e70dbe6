use std::fmt::{Display, Formatter, Result as FmtResult};

/// The kinds of entities a connection manages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A consumer pulling from a station.
    Consumer,

    /// A group of consumers sharing delivery state.
    ConsumerGroup,

    /// A factory grouping stations.
    Factory,

    /// A producer publishing to a station.
    Producer,

    /// A station holding messages.
    Station,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let kind = match self {
            Self::Consumer => "consumer",
            Self::ConsumerGroup => "consumer group",
            Self::Factory => "factory",
            Self::Producer => "producer",
            Self::Station => "station",
        };

        f.write_str(kind)
    }
}

/// An entity addressed by name, used for administrative removal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entity {
    /// A consumer of a station.
    Consumer {
        /// Consumer name.
        name: String,
        /// Station name.
        station: String,
    },

    /// A factory.
    Factory(String),

    /// A producer of a station.
    Producer {
        /// Producer name.
        name: String,
        /// Station name.
        station: String,
    },

    /// A station.
    Station(String),
}

impl Entity {
    /// The kind of the entity.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Consumer { .. } => EntityKind::Consumer,
            Self::Factory(_) => EntityKind::Factory,
            Self::Producer { .. } => EntityKind::Producer,
            Self::Station(_) => EntityKind::Station,
        }
    }

    /// The name of the entity.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Consumer { name, .. }
            | Self::Factory(name)
            | Self::Producer { name, .. }
            | Self::Station(name) => name,
        }
    }
}
