use uuid::Uuid;

/**
 * How many times (after the first attempt) to retry connecting to the peripheral.
 */
pub const CONNECT_RETRIES: u32 = 3;

/**
 * How long (milliseconds) to wait between two connection attempts.
 */
pub const CONNECT_RETRY_DELAY: u64 = 300;

/**
 * How long (milliseconds) all connection attempts together may take.
 */
pub const CONNECT_TIMEOUT: u64 = 3000;

/**
 * How long (milliseconds) a write to a characteristic may take.
 */
pub const WRITE_DEADLINE: u64 = 2000;

/**
 * How often (milliseconds) to poll the adapters for newly discovered peripherals.
 */
pub const SCAN_POLL_DELAY: u64 = 250;

/**
 * How long (milliseconds) to scan for a peripheral before giving up.
 */
pub const SCAN_TIMEOUT: u64 = 10_000;

/**
 * The UUID of the Nordic LED Button Service (LBS)
 */
pub const BLINKY_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001523_1212_efde_1523_785feabcd123);

/**
 * The UUID of the button characteristic. Both buttons share it; the peripheral notifies on it.
 */
pub const BLINKY_BUTTON_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x00001524_1212_efde_1523_785feabcd123);

/**
 * The UUID of the LED characteristic. Both LEDs share it; the central writes to it.
 */
pub const BLINKY_LED_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x00001525_1212_efde_1523_785feabcd123);

pub const VALUE_OFF: [u8; 1] = [0x00];
pub const VALUE_ON: [u8; 1] = [0x01];
