//! Well-known GATT identities, for filters and consumer-side dispatch.

pub mod services {
    use btleplug::api::bleuuid::uuid_from_u16;
    use uuid::Uuid;

    pub const HEART_RATE: Uuid = uuid_from_u16(0x180D);
    pub const BATTERY: Uuid = uuid_from_u16(0x180F);
    pub const DEVICE_INFORMATION: Uuid = uuid_from_u16(0x180A);
}

pub mod characteristics {
    use btleplug::api::bleuuid::uuid_from_u16;
    use uuid::Uuid;

    pub const HEART_RATE_MEASUREMENT: Uuid = uuid_from_u16(0x2A37);
    pub const BATTERY_LEVEL: Uuid = uuid_from_u16(0x2A19);
    pub const MANUFACTURER_NAME: Uuid = uuid_from_u16(0x2A29);
    pub const MODEL_NUMBER: Uuid = uuid_from_u16(0x2A24);
}
