//! Hyundai Ioniq Electric (28 kWh)

use super::Vehicle;
use obd_protocol::ObdProtocol;
use pid_decoder::{Computation, FieldSpec, RequestDescriptor, Scalar};

/// Battery management controller
const BMS_TX: u32 = 0x7E4;
const BMS_RX: u32 = 0x7EC;
/// Vehicle control unit
const VMCU_TX: u32 = 0x7E6;
const VMCU_RX: u32 = 0x7EE;
/// Instrument cluster
const CLUSTER_TX: u32 = 0x7C6;
const CLUSTER_RX: u32 = 0x7CE;

fn celsius(width: u8) -> Scalar {
    Scalar::signed(width).unit("°C")
}

fn cell_voltages(page: u8, first_index: u32) -> RequestDescriptor {
    RequestDescriptor::new(&[0x21, page], BMS_TX, BMS_RX, 38).fields([
        FieldSpec::padding(6),
        FieldSpec::array(
            "cellVoltage%02d",
            first_index,
            32,
            Scalar::unsigned(1).scale(0.02).unit("V"),
        ),
    ])
}

fn descriptors() -> Vec<RequestDescriptor> {
    vec![
        RequestDescriptor::new(&[0x21, 0x01], BMS_TX, BMS_RX, 61).fields([
            FieldSpec::padding(6),
            FieldSpec::value("SOC_BMS", Scalar::unsigned(1).scale(0.5).unit("%")),
            FieldSpec::value(
                "availableChargePower",
                Scalar::unsigned(2).scale(0.01).unit("kW"),
            ),
            FieldSpec::value(
                "availableDischargePower",
                Scalar::unsigned(2).scale(0.01).unit("kW"),
            ),
            FieldSpec::value("charging_bits", Scalar::unsigned(1)),
            FieldSpec::value("dcBatteryCurrent", Scalar::signed(2).scale(0.1).unit("A")),
            FieldSpec::value("dcBatteryVoltage", Scalar::unsigned(2).scale(0.1).unit("V")),
            FieldSpec::value("batteryMaxTemperature", celsius(1)),
            FieldSpec::value("batteryMinTemperature", celsius(1)),
            FieldSpec::array("cellTemp%02d", 1, 5, celsius(1)),
            FieldSpec::padding(1),
            FieldSpec::value("batteryInletTemperature", celsius(1)),
            FieldSpec::padding(4),
            FieldSpec::value("fanStatus", Scalar::unsigned(1)),
            FieldSpec::value("fanFeedback", Scalar::unsigned(1).scale(100.0).unit("RPM")),
            FieldSpec::value("auxBatteryVoltage", Scalar::unsigned(1).scale(0.1).unit("V")),
            FieldSpec::value(
                "cumulativeChargeCurrent",
                Scalar::unsigned(4).scale(0.1).unit("Ah"),
            ),
            FieldSpec::value(
                "cumulativeDischargeCurrent",
                Scalar::unsigned(4).scale(0.1).unit("Ah"),
            ),
            FieldSpec::value(
                "cumulativeEnergyCharged",
                Scalar::unsigned(4).scale(0.1).unit("kWh"),
            ),
            FieldSpec::value(
                "cumulativeEnergyDischarged",
                Scalar::unsigned(4).scale(0.1).unit("kWh"),
            ),
            FieldSpec::value("operatingTime", Scalar::unsigned(4).unit("s")),
            FieldSpec::padding(3),
            FieldSpec::value("driveMotorSpeed", Scalar::signed(2).unit("RPM")),
            FieldSpec::padding(4),
            FieldSpec::computed(
                "dcBatteryPower",
                Computation::product(&["dcBatteryCurrent", "dcBatteryVoltage"], 0.001),
                Some("kW"),
            ),
            FieldSpec::computed("charging", Computation::bit_test("charging_bits", 0x80), None),
            FieldSpec::computed(
                "normalChargePort",
                Computation::bit_test("charging_bits", 0x20),
                None,
            ),
            FieldSpec::computed(
                "rapidChargePort",
                Computation::bit_test("charging_bits", 0x40),
                None,
            ),
        ]),
        cell_voltages(0x02, 1),
        cell_voltages(0x03, 33),
        cell_voltages(0x04, 65),
        RequestDescriptor::new(&[0x21, 0x05], BMS_TX, BMS_RX, 45).fields([
            FieldSpec::padding(11),
            FieldSpec::array("cellTemp%02d", 6, 7, celsius(1)),
            FieldSpec::padding(9),
            FieldSpec::value("soh", Scalar::unsigned(2).scale(0.1).unit("%")),
            FieldSpec::padding(4),
            FieldSpec::value("SOC_DISPLAY", Scalar::unsigned(1).scale(0.5).unit("%")),
            FieldSpec::padding(11),
        ]),
        RequestDescriptor::new(&[0x21, 0x80], VMCU_TX, VMCU_RX, 25).fields([
            FieldSpec::padding(14),
            FieldSpec::value(
                "externalTemperature",
                Scalar::unsigned(1).scale(0.5).offset(-40.0).unit("°C"),
            ),
            FieldSpec::padding(10),
        ]),
        RequestDescriptor::new(&[0x22, 0xB0, 0x02], CLUSTER_TX, CLUSTER_RX, 15)
            .optional()
            .fields([
                FieldSpec::padding(9),
                FieldSpec::value("odo", Scalar::unsigned(3).unit("km")),
                FieldSpec::padding(3),
            ]),
    ]
}

/// Ioniq Electric BMS, VMCU and cluster tables on 11-bit 500 kbit/s CAN
pub struct IoniqBev {
    descriptors: Vec<RequestDescriptor>,
}

impl IoniqBev {
    pub fn new() -> Self {
        Self {
            descriptors: descriptors(),
        }
    }
}

impl Default for IoniqBev {
    fn default() -> Self {
        Self::new()
    }
}

impl Vehicle for IoniqBev {
    fn name(&self) -> &'static str {
        "IoniqBev"
    }

    fn protocol(&self) -> ObdProtocol {
        ObdProtocol::Iso15765_4Can11bit500
    }

    fn descriptors(&self) -> &[RequestDescriptor] {
        &self.descriptors
    }
}
